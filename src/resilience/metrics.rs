use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counters for the device connection pool
#[derive(Debug, Default)]
pub struct PoolMetrics {
    /// Sessions opened against devices, pooled or temporary
    total_connections_created: AtomicU64,
    /// Sessions currently leased to callers
    active_connections: AtomicU64,
    /// Failed network interactions (connect, probe or operation)
    failed_connections: AtomicU64,
    /// Attempts made after the first one inside the retry executor
    retry_attempts: AtomicU64,
    /// Closed/HalfOpen to Open transitions, forced ones included
    circuit_breaker_trips: AtomicU64,
    /// Requests rejected because a breaker was open
    circuit_breaker_rejections: AtomicU64,
}

impl PoolMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_connection_created(&self) {
        self.total_connections_created.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_lease(&self) {
        self.active_connections.fetch_add(1, Ordering::SeqCst);
    }

    /// A leased session came back, was discarded or was reclaimed as an orphan
    pub fn record_lease_end(&self) {
        // Never wraps below zero, close_all may have reset the gauge already
        let _ = self
            .active_connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                Some(n.saturating_sub(1))
            });
    }

    pub fn reset_active(&self) {
        self.active_connections.store(0, Ordering::SeqCst);
    }

    pub fn record_failure(&self) {
        self.failed_connections.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_retry(&self) {
        self.retry_attempts.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_circuit_breaker_trip(&self) {
        self.circuit_breaker_trips.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_circuit_breaker_rejection(&self) {
        self.circuit_breaker_rejections.fetch_add(1, Ordering::SeqCst);
    }

    pub fn total_connections_created(&self) -> u64 {
        self.total_connections_created.load(Ordering::SeqCst)
    }

    pub fn active_connections(&self) -> u64 {
        self.active_connections.load(Ordering::SeqCst)
    }

    pub fn failed_connections(&self) -> u64 {
        self.failed_connections.load(Ordering::SeqCst)
    }

    pub fn retry_attempts(&self) -> u64 {
        self.retry_attempts.load(Ordering::SeqCst)
    }

    pub fn circuit_breaker_trips(&self) -> u64 {
        self.circuit_breaker_trips.load(Ordering::SeqCst)
    }

    pub fn circuit_breaker_rejections(&self) -> u64 {
        self.circuit_breaker_rejections.load(Ordering::SeqCst)
    }

    /// Get metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_connections_created: self.total_connections_created(),
            active_connections: self.active_connections(),
            failed_connections: self.failed_connections(),
            retry_attempts: self.retry_attempts(),
            circuit_breaker_trips: self.circuit_breaker_trips(),
            circuit_breaker_rejections: self.circuit_breaker_rejections(),
        }
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub total_connections_created: u64,
    pub active_connections: u64,
    pub failed_connections: u64,
    pub retry_attempts: u64,
    pub circuit_breaker_trips: u64,
    pub circuit_breaker_rejections: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initial_state() {
        let metrics = PoolMetrics::new();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_connections_created, 0);
        assert_eq!(snapshot.active_connections, 0);
        assert_eq!(snapshot.failed_connections, 0);
        assert_eq!(snapshot.retry_attempts, 0);
        assert_eq!(snapshot.circuit_breaker_trips, 0);
    }

    #[test]
    fn test_active_gauge_never_underflows() {
        let metrics = PoolMetrics::new();
        metrics.record_lease();
        metrics.record_lease_end();
        metrics.record_lease_end();
        assert_eq!(metrics.active_connections(), 0);
    }

    #[test]
    fn test_reset_active_after_shutdown() {
        let metrics = PoolMetrics::new();
        metrics.record_lease();
        metrics.record_lease();
        metrics.reset_active();
        assert_eq!(metrics.active_connections(), 0);
    }

    #[test]
    fn test_metrics_snapshot() {
        let metrics = PoolMetrics::new();
        metrics.record_connection_created();
        metrics.record_connection_created();
        metrics.record_failure();
        metrics.record_retry();
        metrics.record_circuit_breaker_trip();
        metrics.record_circuit_breaker_rejection();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_connections_created, 2);
        assert_eq!(snapshot.failed_connections, 1);
        assert_eq!(snapshot.retry_attempts, 1);
        assert_eq!(snapshot.circuit_breaker_trips, 1);
        assert_eq!(snapshot.circuit_breaker_rejections, 1);
    }
}
