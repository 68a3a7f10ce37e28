use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use super::metrics::PoolMetrics;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed - normal operation
    Closed,
    /// Circuit is open - failing, reject requests immediately
    Open,
    /// Circuit is half-open - testing if the device recovered
    HalfOpen,
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Time since the last failure before an open circuit lets a trial through
    #[serde(with = "crate::config::duration_secs")]
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
}

/// Point-in-time view of a breaker, for reports.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerSnapshot {
    pub state: CircuitState,
    pub failures: u32,
    /// Seconds since the last recorded failure
    pub last_failure_secs_ago: Option<f64>,
    pub threshold: u32,
    pub recovery_timeout_secs: u64,
}

/// Circuit breaker guarding one device endpoint
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    metrics: Arc<PoolMetrics>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with default configuration
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    /// Create a new circuit breaker with custom configuration
    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
            }),
            metrics: Arc::new(PoolMetrics::new()),
        }
    }

    /// Count trips into a shared metrics aggregator instead of a private one
    pub fn with_metrics(mut self, metrics: Arc<PoolMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check if a request should be allowed
    pub fn allow_request(&self) -> bool {
        let mut inner = self.lock();

        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let recovered = inner
                    .last_failure
                    .map_or(true, |at| at.elapsed() > self.config.recovery_timeout);
                if recovered {
                    debug!("Circuit breaker transitioning from Open to HalfOpen");
                    inner.state = CircuitState::HalfOpen;
                    inner.failure_count = 0;
                    true
                } else {
                    false
                }
            }
            // A single trial is in flight; its outcome decides the next state
            CircuitState::HalfOpen => true,
        }
    }

    /// Record a successful call
    pub fn record_success(&self) {
        let mut inner = self.lock();

        if inner.state == CircuitState::HalfOpen {
            debug!("Circuit breaker transitioning from HalfOpen to Closed");
            inner.state = CircuitState::Closed;
        }
        inner.failure_count = 0;
    }

    /// Record a failed call. Returns true when this failure tripped the circuit.
    pub fn record_failure(&self) -> bool {
        let mut inner = self.lock();
        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());

        match inner.state {
            CircuitState::Closed if inner.failure_count >= self.config.failure_threshold => {
                error!(
                    "Circuit breaker transitioning from Closed to Open ({} failures)",
                    inner.failure_count
                );
                inner.state = CircuitState::Open;
                self.metrics.record_circuit_breaker_trip();
                true
            }
            CircuitState::HalfOpen => {
                warn!("Circuit breaker transitioning from HalfOpen to Open (trial failed)");
                inner.state = CircuitState::Open;
                false
            }
            _ => false,
        }
    }

    /// Open the circuit regardless of the failure count.
    ///
    /// Counts as a trip unless the circuit was already open.
    pub fn force_open(&self) -> bool {
        let mut inner = self.lock();
        inner.last_failure = Some(Instant::now());
        if inner.state == CircuitState::Open {
            return false;
        }
        warn!("Circuit breaker forced Open from {:?}", inner.state);
        inner.state = CircuitState::Open;
        self.metrics.record_circuit_breaker_trip();
        true
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Get current consecutive failure count
    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let inner = self.lock();
        CircuitBreakerSnapshot {
            state: inner.state,
            failures: inner.failure_count,
            last_failure_secs_ago: inner.last_failure.map(|at| at.elapsed().as_secs_f64()),
            threshold: self.config.failure_threshold,
            recovery_timeout_secs: self.config.recovery_timeout.as_secs(),
        }
    }

    /// Reset circuit breaker to closed state
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.last_failure = None;
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}
