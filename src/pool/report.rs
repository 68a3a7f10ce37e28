//! Read-only views of pool state for the monitoring surface.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::time::Instant;

use super::endpoint::Endpoint;
use super::manager::ConnectionPool;
use crate::device::{DeviceConnector, EndpointKey};
use crate::resilience::{
    classify, CircuitBreakerConfig, CircuitBreakerSnapshot, HealthRecord, HealthStatus,
    MetricsSnapshot, RetryConfig,
};

/// Counts of sessions removed by a cleanup sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupStats {
    pub expired_connections: usize,
    pub unhealthy_connections: usize,
    pub orphaned_connections: usize,
    pub total_cleaned: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub success_rate: f64,
    pub consecutive_failures: u32,
    pub healthy: bool,
    pub last_check: Option<DateTime<Utc>>,
}

impl From<&HealthRecord> for HealthMetrics {
    fn from(record: &HealthRecord) -> Self {
        Self {
            total_requests: record.total_requests,
            successful_requests: record.successful_requests,
            success_rate: record.success_rate(),
            consecutive_failures: record.consecutive_failures,
            healthy: record.healthy,
            last_check: record.last_check,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolStatistics {
    /// Pooled sessions, idle and leased
    pub pool_size: usize,
    pub idle_connections: usize,
    pub leased_connections: usize,
    pub max_connections: usize,
    /// `pool_size / max_connections` as a percentage
    pub pool_utilization: f64,
    /// Idle sessions past the idle timeout, waiting to be purged
    pub expired_connections: usize,
    pub orphaned_connections: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EndpointHealthReport {
    pub server: String,
    pub status: HealthStatus,
    pub status_message: String,
    pub circuit_breaker: CircuitBreakerSnapshot,
    pub health_metrics: HealthMetrics,
    pub pool_statistics: PoolStatistics,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub total_servers: usize,
    pub healthy_servers: usize,
    pub degraded_servers: usize,
    /// Endpoints in WARNING or CRITICAL state
    pub critical_servers: usize,
    pub total_active_connections: u64,
    pub total_pooled_connections: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolHealthReport {
    pub summary: HealthSummary,
    pub servers: BTreeMap<String, EndpointHealthReport>,
    pub system_metrics: MetricsSnapshot,
}

/// Configuration as exposed to operators
#[derive(Debug, Clone, Serialize)]
pub struct PoolConfigView {
    pub max_connections: usize,
    pub timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry: RetryConfig,
    pub active_servers: Vec<String>,
}

impl<C: DeviceConnector> ConnectionPool<C> {
    /// Health of one endpoint; `None` if the pool has never seen it
    pub fn report(&self, endpoint: &EndpointKey) -> Option<EndpointHealthReport> {
        self.known_endpoint(endpoint)
            .map(|ep| self.endpoint_report(&ep))
    }

    /// Health of every endpoint the pool has seen, plus process-wide counters
    pub fn report_all(&self) -> PoolHealthReport {
        let servers: BTreeMap<_, _> = self
            .all_endpoints()
            .iter()
            .map(|ep| (ep.key.to_string(), self.endpoint_report(ep)))
            .collect();

        let count = |wanted: &[HealthStatus]| {
            servers
                .values()
                .filter(|r| wanted.contains(&r.status))
                .count()
        };
        let metrics = self.metrics().snapshot();

        PoolHealthReport {
            summary: HealthSummary {
                total_servers: servers.len(),
                healthy_servers: count(&[HealthStatus::Healthy]),
                degraded_servers: count(&[HealthStatus::Degraded]),
                critical_servers: count(&[HealthStatus::Warning, HealthStatus::Critical]),
                total_active_connections: metrics.active_connections,
                total_pooled_connections: servers
                    .values()
                    .map(|r| r.pool_statistics.pool_size)
                    .sum(),
                timestamp: Utc::now(),
            },
            servers,
            system_metrics: metrics,
        }
    }

    pub fn config(&self) -> PoolConfigView {
        let config = self.pool_config();
        PoolConfigView {
            max_connections: config.max_connections,
            timeout_secs: config.operation_timeout.as_secs(),
            idle_timeout_secs: config.idle_timeout.as_secs(),
            circuit_breaker: config.circuit_breaker.clone(),
            retry: config.retry.clone(),
            active_servers: self
                .all_endpoints()
                .iter()
                .map(|ep| ep.key.to_string())
                .collect(),
        }
    }

    fn endpoint_report(&self, ep: &Endpoint<C::Session>) -> EndpointHealthReport {
        let breaker = ep.breaker.snapshot();
        let record = ep.health.record();
        let (status, status_message) = classify(&record, breaker.state);

        let max_connections = self.pool_config().max_connections;
        let idle_timeout = self.pool_config().idle_timeout;
        let pool_statistics = {
            let slots = ep.slots();
            let now = Instant::now();
            let pool_size = slots.pooled_count();
            PoolStatistics {
                pool_size,
                idle_connections: slots.idle.len(),
                leased_connections: slots.checked_out.len(),
                max_connections,
                pool_utilization: if max_connections == 0 {
                    0.0
                } else {
                    pool_size as f64 / max_connections as f64 * 100.0
                },
                expired_connections: slots
                    .idle
                    .iter()
                    .filter(|s| s.is_expired(now, idle_timeout))
                    .count(),
                orphaned_connections: slots.orphans.len(),
            }
        };

        EndpointHealthReport {
            server: ep.key.to_string(),
            status,
            status_message,
            circuit_breaker: breaker,
            health_metrics: HealthMetrics::from(&record),
            pool_statistics,
            timestamp: Utc::now(),
        }
    }
}
