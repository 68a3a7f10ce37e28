use std::str::FromStr;
use std::time::Duration;

use crate::device::{Credentials, EndpointKey};
use crate::resilience::{CircuitBreakerConfig, RetryConfig};

/// Settings for a [`crate::pool::ConnectionPool`]
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Pooled sessions allowed per endpoint; demand beyond this gets temporary sessions
    pub max_connections: usize,
    /// Bound on a single operation run by the retry executor
    pub operation_timeout: Duration,
    /// Idle time after which a pooled session is disconnected
    pub idle_timeout: Duration,
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry: RetryConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            operation_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(300),
            circuit_breaker: CircuitBreakerConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

/// Process configuration for the monitoring service
pub struct Config {
    pub port: u16,
    pub pool: PoolConfig,
    /// Also the period of the device liveness checks
    pub cleanup_interval: Duration,
    /// Devices checked on every tick; entries that do not parse as `host:port` are skipped
    pub devices: Vec<EndpointKey>,
    pub credentials: Credentials,
    pub json_logs: bool,
}

fn parse_devices(raw: &str) -> Vec<EndpointKey> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| entry.parse().ok())
        .collect()
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = PoolConfig::default();
        Self {
            port: env_or("PORT", 8080),
            pool: PoolConfig {
                max_connections: env_or("POOL_MAX_CONNECTIONS", defaults.max_connections),
                operation_timeout: Duration::from_secs(env_or(
                    "POOL_TIMEOUT_SECS",
                    defaults.operation_timeout.as_secs(),
                )),
                idle_timeout: Duration::from_secs(env_or(
                    "POOL_IDLE_TIMEOUT_SECS",
                    defaults.idle_timeout.as_secs(),
                )),
                circuit_breaker: CircuitBreakerConfig {
                    failure_threshold: env_or(
                        "BREAKER_FAILURE_THRESHOLD",
                        defaults.circuit_breaker.failure_threshold,
                    ),
                    recovery_timeout: Duration::from_secs(env_or(
                        "BREAKER_RECOVERY_TIMEOUT_SECS",
                        defaults.circuit_breaker.recovery_timeout.as_secs(),
                    )),
                },
                retry: RetryConfig {
                    max_retries: env_or("RETRY_MAX_RETRIES", defaults.retry.max_retries),
                    base_delay: Duration::from_millis(env_or(
                        "RETRY_BASE_DELAY_MS",
                        defaults.retry.base_delay.as_millis() as u64,
                    )),
                    max_delay: Duration::from_millis(env_or(
                        "RETRY_MAX_DELAY_MS",
                        defaults.retry.max_delay.as_millis() as u64,
                    )),
                    use_jitter: defaults.retry.use_jitter,
                },
            },
            cleanup_interval: Duration::from_secs(env_or("POOL_CLEANUP_INTERVAL_SECS", 60)),
            devices: std::env::var("DEVICES")
                .map(|raw| parse_devices(&raw))
                .unwrap_or_default(),
            credentials: Credentials::new(
                std::env::var("DEVICE_USERNAME").unwrap_or_else(|_| "admin".to_string()),
                std::env::var("DEVICE_PASSWORD").unwrap_or_default(),
            ),
            json_logs: std::env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        }
    }
}

/// Serialize a `Duration` as whole seconds
pub mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }
}

/// Serialize a `Duration` as whole milliseconds
pub mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}
