//! Device connection pool: per-endpoint session reuse guarded by circuit
//! breakers, with a retry executor on top.

mod endpoint;
pub mod error;
pub mod executor;
pub mod manager;
pub mod report;
pub mod session;

pub use error::*;
pub use executor::*;
pub use manager::*;
pub use report::*;
pub use session::*;

use async_trait::async_trait;

use crate::device::{Credentials, DeviceConnector, EndpointKey};
use crate::resilience::MetricsSnapshot;

/// The administrative view of a pool, independent of its driver type.
///
/// This is what the monitoring API holds on to.
#[async_trait]
pub trait PoolAdmin: Send + Sync {
    fn report(&self, endpoint: &EndpointKey) -> Option<EndpointHealthReport>;

    fn report_all(&self) -> PoolHealthReport;

    fn config(&self) -> PoolConfigView;

    fn metrics_snapshot(&self) -> MetricsSnapshot;

    async fn cleanup_stale(&self) -> CleanupStats;

    async fn check(&self, endpoint: &EndpointKey, credentials: &Credentials)
        -> Result<(), PoolError>;
}

#[async_trait]
impl<C: DeviceConnector> PoolAdmin for ConnectionPool<C> {
    fn report(&self, endpoint: &EndpointKey) -> Option<EndpointHealthReport> {
        ConnectionPool::report(self, endpoint)
    }

    fn report_all(&self) -> PoolHealthReport {
        ConnectionPool::report_all(self)
    }

    fn config(&self) -> PoolConfigView {
        ConnectionPool::config(self)
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics().snapshot()
    }

    async fn cleanup_stale(&self) -> CleanupStats {
        ConnectionPool::cleanup_stale(self).await
    }

    async fn check(
        &self,
        endpoint: &EndpointKey,
        credentials: &Credentials,
    ) -> Result<(), PoolError> {
        ConnectionPool::check(self, endpoint, credentials).await
    }
}
