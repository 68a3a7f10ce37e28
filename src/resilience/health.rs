use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::circuit_breaker::CircuitState;

/// Success rate (percent) below which an endpoint counts as degraded
pub const DEGRADED_SUCCESS_RATE: f64 = 80.0;
/// Consecutive failures above which an endpoint counts as degraded
pub const DEGRADED_CONSECUTIVE_FAILURES: u32 = 3;

/// Derived status of one endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Warning,
    Critical,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthStatus::Healthy => "HEALTHY",
            HealthStatus::Degraded => "DEGRADED",
            HealthStatus::Warning => "WARNING",
            HealthStatus::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

/// Request counters for one endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthRecord {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub consecutive_failures: u32,
    pub healthy: bool,
    pub last_check: Option<DateTime<Utc>>,
}

impl Default for HealthRecord {
    fn default() -> Self {
        Self {
            total_requests: 0,
            successful_requests: 0,
            consecutive_failures: 0,
            healthy: true,
            last_check: None,
        }
    }
}

impl HealthRecord {
    /// Percentage of successful requests; 100 before anything was recorded
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 100.0;
        }
        self.successful_requests as f64 / self.total_requests as f64 * 100.0
    }
}

/// Classify an endpoint, with the breaker state taking precedence over counters
pub fn classify(record: &HealthRecord, breaker: CircuitState) -> (HealthStatus, String) {
    match breaker {
        CircuitState::Open => (
            HealthStatus::Critical,
            "Circuit breaker OPEN - device unavailable".to_string(),
        ),
        CircuitState::HalfOpen => (
            HealthStatus::Warning,
            "Circuit breaker HALF_OPEN - testing device recovery".to_string(),
        ),
        CircuitState::Closed if record.consecutive_failures > DEGRADED_CONSECUTIVE_FAILURES => (
            HealthStatus::Degraded,
            format!(
                "Multiple consecutive failures ({})",
                record.consecutive_failures
            ),
        ),
        CircuitState::Closed if record.success_rate() < DEGRADED_SUCCESS_RATE => (
            HealthStatus::Degraded,
            format!("Low success rate ({:.1}%)", record.success_rate()),
        ),
        CircuitState::Closed => (
            HealthStatus::Healthy,
            "All systems operational".to_string(),
        ),
    }
}

/// Tracks request outcomes for one endpoint
#[derive(Debug, Default)]
pub struct HealthMonitor {
    record: Mutex<HealthRecord>,
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HealthRecord> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_outcome(&self, success: bool) {
        let mut record = self.lock();
        record.total_requests += 1;
        record.last_check = Some(Utc::now());
        if success {
            record.successful_requests += 1;
            record.consecutive_failures = 0;
            record.healthy = true;
        } else {
            record.consecutive_failures += 1;
            record.healthy = false;
        }
    }

    pub fn record(&self) -> HealthRecord {
        self.lock().clone()
    }

    pub fn classify(&self, breaker: CircuitState) -> HealthStatus {
        classify(&self.lock(), breaker).0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(total: u64, successful: u64, consecutive: u32) -> HealthRecord {
        HealthRecord {
            total_requests: total,
            successful_requests: successful,
            consecutive_failures: consecutive,
            healthy: consecutive == 0,
            last_check: None,
        }
    }

    #[test]
    fn test_ninety_percent_is_healthy() {
        let (status, _) = classify(&record(10, 9, 0), CircuitState::Closed);
        assert_eq!(status, HealthStatus::Healthy);
    }

    #[test]
    fn test_seventy_percent_is_degraded() {
        let (status, message) = classify(&record(10, 7, 0), CircuitState::Closed);
        assert_eq!(status, HealthStatus::Degraded);
        assert!(message.contains("70.0%"));
    }

    #[test]
    fn test_consecutive_failures_degrade() {
        let (status, _) = classify(&record(100, 96, 4), CircuitState::Closed);
        assert_eq!(status, HealthStatus::Degraded);

        let (status, _) = classify(&record(100, 97, 3), CircuitState::Closed);
        assert_eq!(status, HealthStatus::Healthy);
    }

    #[test]
    fn test_breaker_state_takes_precedence() {
        let perfect = record(10, 10, 0);
        assert_eq!(classify(&perfect, CircuitState::Open).0, HealthStatus::Critical);
        assert_eq!(classify(&perfect, CircuitState::HalfOpen).0, HealthStatus::Warning);
    }

    #[test]
    fn test_no_requests_is_healthy() {
        let empty = HealthRecord::default();
        assert_eq!(empty.success_rate(), 100.0);
        assert_eq!(classify(&empty, CircuitState::Closed).0, HealthStatus::Healthy);
    }

    #[test]
    fn test_monitor_records_outcomes() {
        let monitor = HealthMonitor::new();
        monitor.record_outcome(true);
        monitor.record_outcome(false);
        monitor.record_outcome(false);

        let snapshot = monitor.record();
        assert_eq!(snapshot.total_requests, 3);
        assert_eq!(snapshot.successful_requests, 1);
        assert_eq!(snapshot.consecutive_failures, 2);
        assert!(!snapshot.healthy);
        assert!(snapshot.last_check.is_some());

        monitor.record_outcome(true);
        let snapshot = monitor.record();
        assert_eq!(snapshot.consecutive_failures, 0);
        assert!(snapshot.healthy);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(HealthStatus::Degraded.to_string(), "DEGRADED");
        assert_eq!(
            serde_json::to_value(HealthStatus::Critical).unwrap(),
            serde_json::json!("CRITICAL")
        );
    }
}
