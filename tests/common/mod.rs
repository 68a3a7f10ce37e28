#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use netpool::config::PoolConfig;
use netpool::device::{Credentials, DeviceConnector, DeviceError, DeviceSession, EndpointKey};
use netpool::pool::ConnectionPool;
use netpool::resilience::{CircuitBreakerConfig, RetryConfig};

/// Shared knobs and counters behind a [`MockConnector`]
pub struct Script {
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub probes: AtomicUsize,
    /// Upcoming connects to refuse
    pub refuse_connects: AtomicUsize,
    pub probe_ok: AtomicBool,
}

impl Script {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn refuse_next(&self, n: usize) {
        self.refuse_connects.store(n, Ordering::SeqCst);
    }

    pub fn set_probe_ok(&self, ok: bool) {
        self.probe_ok.store(ok, Ordering::SeqCst);
    }
}

pub struct MockConnector {
    pub script: Arc<Script>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Script {
                connects: AtomicUsize::new(0),
                disconnects: AtomicUsize::new(0),
                probes: AtomicUsize::new(0),
                refuse_connects: AtomicUsize::new(0),
                probe_ok: AtomicBool::new(true),
            }),
        }
    }
}

pub struct MockSession {
    /// Order in which the session was opened, starting at 1
    pub serial: usize,
    script: Arc<Script>,
}

impl MockSession {
    pub async fn run(&mut self, command: &str) -> Result<String, DeviceError> {
        Ok(format!("{}@{}", command, self.serial))
    }
}

#[async_trait]
impl DeviceSession for MockSession {
    async fn probe(&mut self) -> Result<(), DeviceError> {
        self.script.probes.fetch_add(1, Ordering::SeqCst);
        if self.script.probe_ok.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DeviceError::ProbeFailed("no reply".to_string()))
        }
    }

    async fn disconnect(&mut self) -> Result<(), DeviceError> {
        self.script.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl DeviceConnector for MockConnector {
    type Session = MockSession;

    async fn connect(
        &self,
        endpoint: &EndpointKey,
        _credentials: &Credentials,
    ) -> Result<MockSession, DeviceError> {
        let serial = self.script.connects.fetch_add(1, Ordering::SeqCst) + 1;
        let refused = self
            .script
            .refuse_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(DeviceError::ConnectionRefused(endpoint.to_string()));
        }
        Ok(MockSession {
            serial,
            script: Arc::clone(&self.script),
        })
    }
}

pub fn test_config() -> PoolConfig {
    PoolConfig {
        max_connections: 2,
        operation_timeout: Duration::from_secs(5),
        idle_timeout: Duration::from_secs(300),
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        },
        retry: RetryConfig {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            use_jitter: false,
        },
    }
}

pub fn mock_pool(config: PoolConfig) -> (Arc<ConnectionPool<MockConnector>>, Arc<Script>) {
    let connector = MockConnector::new();
    let script = Arc::clone(&connector.script);
    (Arc::new(ConnectionPool::new(connector, config)), script)
}

pub fn router() -> EndpointKey {
    EndpointKey::new("10.0.0.1", 8728)
}

pub fn creds() -> Credentials {
    Credentials::new("admin", "secret")
}
