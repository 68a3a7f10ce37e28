use serde::Serialize;
use std::time::Duration;

/// Jitter added on top of each backoff step, as a fraction of that step
const JITTER_FRACTION: f64 = 0.1;

/// Retry configuration
#[derive(Debug, Clone, Serialize)]
pub struct RetryConfig {
    /// Retries after the initial attempt; total attempts are `max_retries + 1`
    pub max_retries: u32,
    /// Delay before the first retry, doubled for every further one
    #[serde(rename = "base_delay_ms", with = "crate::config::duration_millis")]
    pub base_delay: Duration,
    /// Upper bound for any single delay, jitter included
    #[serde(rename = "max_delay_ms", with = "crate::config::duration_millis")]
    pub max_delay: Duration,
    /// Whether to add up to 10% random jitter to each delay
    pub use_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            use_jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Delay to wait after the failed attempt number `attempt` (0-based)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64 * 2f64.powi(attempt.min(63) as i32);

        let jitter_ms = if self.use_jitter {
            base_ms * JITTER_FRACTION * fastrand::f64()
        } else {
            0.0
        };

        let delay_ms = (base_ms + jitter_ms).min(self.max_delay.as_millis() as f64);
        Duration::from_millis(delay_ms as u64)
    }
}

/// Error types that should trigger retries
pub trait RetryableError: std::error::Error {
    /// Check if this error should trigger a retry
    fn is_retryable(&self) -> bool;
}
