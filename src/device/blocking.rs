//! Adapter for synchronous vendor drivers.
//!
//! Most router management libraries expose blocking calls. Running them on
//! the async worker threads would stall every other request, so each call is
//! shipped to tokio's blocking pool, and a semaphore caps how many of those
//! calls may be in flight at once.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::trace;

use super::{Credentials, DeviceConnector, DeviceError, DeviceSession, EndpointKey};

/// A synchronous driver for some device management protocol.
pub trait BlockingDriver: Send + Sync + 'static {
    type Session: Send + 'static;

    fn connect(
        &self,
        endpoint: &EndpointKey,
        credentials: &Credentials,
    ) -> Result<Self::Session, DeviceError>;

    fn probe(&self, session: &mut Self::Session) -> Result<(), DeviceError>;

    fn disconnect(&self, session: &mut Self::Session) -> Result<(), DeviceError>;
}

/// Runs a [`BlockingDriver`] off the async scheduler with bounded concurrency.
pub struct BlockingConnector<D: BlockingDriver> {
    driver: Arc<D>,
    permits: Arc<Semaphore>,
}

impl<D: BlockingDriver> BlockingConnector<D> {
    pub fn new(driver: D, max_blocking_calls: usize) -> Self {
        Self {
            driver: Arc::new(driver),
            permits: Arc::new(Semaphore::new(max_blocking_calls.max(1))),
        }
    }

    /// Blocking calls that may start right now without waiting.
    pub fn available_workers(&self) -> usize {
        self.permits.available_permits()
    }
}

/// Session produced by a [`BlockingConnector`].
pub struct BlockingSession<D: BlockingDriver> {
    driver: Arc<D>,
    permits: Arc<Semaphore>,
    // Taken while a call is running on the blocking pool
    session: Option<D::Session>,
}

impl<D: BlockingDriver> BlockingSession<D> {
    /// Run a blocking call against the underlying driver session.
    ///
    /// If the calling future is dropped mid-call, the driver session is lost
    /// with it and every later call fails with [`DeviceError::Worker`]; the
    /// pool discards such sessions.
    pub async fn run<T, F>(&mut self, f: F) -> Result<T, DeviceError>
    where
        F: FnOnce(&D, &mut D::Session) -> Result<T, DeviceError> + Send + 'static,
        T: Send + 'static,
    {
        let _permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| DeviceError::Worker("blocking pool closed".to_string()))?;
        let mut session = self
            .session
            .take()
            .ok_or_else(|| DeviceError::Worker("session lost by an interrupted call".to_string()))?;
        let driver = Arc::clone(&self.driver);

        let (session, result) = tokio::task::spawn_blocking(move || {
            let result = f(&driver, &mut session);
            (session, result)
        })
        .await
        .map_err(|e| DeviceError::Worker(e.to_string()))?;

        self.session = Some(session);
        result
    }
}

#[async_trait]
impl<D: BlockingDriver> DeviceSession for BlockingSession<D> {
    async fn probe(&mut self) -> Result<(), DeviceError> {
        self.run(|driver, session| driver.probe(session)).await
    }

    async fn disconnect(&mut self) -> Result<(), DeviceError> {
        if self.session.is_none() {
            return Ok(());
        }
        self.run(|driver, session| driver.disconnect(session)).await
    }
}

#[async_trait]
impl<D: BlockingDriver> DeviceConnector for BlockingConnector<D> {
    type Session = BlockingSession<D>;

    async fn connect(
        &self,
        endpoint: &EndpointKey,
        credentials: &Credentials,
    ) -> Result<Self::Session, DeviceError> {
        let _permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| DeviceError::Worker("blocking pool closed".to_string()))?;
        let driver = Arc::clone(&self.driver);
        let endpoint = endpoint.clone();
        let credentials = credentials.clone();

        trace!("Opening blocking driver session to {}", endpoint);
        let session = tokio::task::spawn_blocking(move || driver.connect(&endpoint, &credentials))
            .await
            .map_err(|e| DeviceError::Worker(e.to_string()))??;

        Ok(BlockingSession {
            driver: Arc::clone(&self.driver),
            permits: Arc::clone(&self.permits),
            session: Some(session),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct SlowDriver {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        disconnects: AtomicUsize,
    }

    impl BlockingDriver for SlowDriver {
        type Session = u32;

        fn connect(&self, endpoint: &EndpointKey, _: &Credentials) -> Result<u32, DeviceError> {
            if endpoint.port == 0 {
                return Err(DeviceError::ConnectionRefused("port 0".to_string()));
            }
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(30));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(7)
        }

        fn probe(&self, session: &mut u32) -> Result<(), DeviceError> {
            *session += 1;
            Ok(())
        }

        fn disconnect(&self, _: &mut u32) -> Result<(), DeviceError> {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn creds() -> Credentials {
        Credentials::new("admin", "admin")
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_blocking_calls_are_bounded() {
        let connector = Arc::new(BlockingConnector::new(SlowDriver::default(), 2));
        let endpoint = EndpointKey::new("10.0.0.1", 8728);

        let mut handles = Vec::new();
        for _ in 0..6 {
            let connector = Arc::clone(&connector);
            let endpoint = endpoint.clone();
            handles.push(tokio::spawn(async move {
                connector.connect(&endpoint, &creds()).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        assert!(connector.driver.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(connector.available_workers(), 2);
    }

    #[tokio::test]
    async fn test_session_round_trip_through_blocking_pool() {
        let connector = BlockingConnector::new(SlowDriver::default(), 1);
        let mut session = connector
            .connect(&EndpointKey::new("10.0.0.1", 8728), &creds())
            .await
            .unwrap();

        session.probe().await.unwrap();
        let value = session.run(|_, s| Ok(*s)).await.unwrap();
        assert_eq!(value, 8);

        session.disconnect().await.unwrap();
        assert_eq!(connector.driver.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_connect_error_is_propagated() {
        let connector = BlockingConnector::new(SlowDriver::default(), 1);
        let result = connector.connect(&EndpointKey::new("10.0.0.1", 0), &creds()).await;
        assert!(matches!(result, Err(DeviceError::ConnectionRefused(_))));
    }
}
