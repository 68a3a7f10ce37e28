use std::future::Future;
use std::pin::Pin;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use super::error::PoolError;
use super::manager::ConnectionPool;
use crate::device::{Credentials, DeviceConnector, DeviceError, DeviceSession, EndpointKey};
use crate::resilience::{RetryConfig, RetryableError};

/// Future returned by an operation; it may borrow the session it runs against
pub type OperationFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, DeviceError>> + Send + 'a>>;

impl<C: DeviceConnector> ConnectionPool<C> {
    /// [`execute_with_retry`](Self::execute_with_retry) with the pool's retry settings
    pub async fn execute<T, F>(
        &self,
        endpoint: &EndpointKey,
        credentials: &Credentials,
        operation: F,
    ) -> Result<T, PoolError>
    where
        F: for<'a> Fn(&'a mut C::Session) -> OperationFuture<'a, T>,
    {
        let retry = self.pool_config().retry.clone();
        self.execute_with_retry(endpoint, credentials, operation, &retry)
            .await
    }

    /// Run `operation` against a session for `endpoint`, retrying failures.
    ///
    /// Each attempt acquires a session, runs the operation under the pool's
    /// operation timeout, and on success releases the session back to the
    /// pool. A failed session is always discarded. Between attempts the call
    /// sleeps with exponential backoff. An open breaker ends the loop at once
    /// with [`PoolError::CircuitOpen`], and a non-retryable failure ends it with
    /// [`PoolError::Device`]. When every attempt fails the breaker is forced
    /// open and the last failure is returned.
    pub async fn execute_with_retry<T, F>(
        &self,
        endpoint: &EndpointKey,
        credentials: &Credentials,
        operation: F,
        retry: &RetryConfig,
    ) -> Result<T, PoolError>
    where
        F: for<'a> Fn(&'a mut C::Session) -> OperationFuture<'a, T>,
    {
        let ep = self.endpoint(endpoint);
        let max_attempts = retry.max_retries.saturating_add(1);
        let mut attempts = 0;
        let mut last_error = None;

        for attempt in 0..max_attempts {
            attempts = attempt + 1;
            if attempt > 0 {
                self.metrics().record_retry();
            }
            debug!("Attempt {}/{} for {}", attempts, max_attempts, endpoint);

            let outcome = match self.acquire(endpoint, credentials).await {
                Ok(mut session) => {
                    let result = match timeout(
                        self.pool_config().operation_timeout,
                        operation(&mut *session),
                    )
                    .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(DeviceError::Timeout(format!(
                            "operation exceeded {:?}",
                            self.pool_config().operation_timeout
                        ))),
                    };

                    match result {
                        Ok(value) => {
                            self.record_success(&ep);
                            self.release(session).await;
                            if attempt > 0 {
                                info!(
                                    "Operation succeeded for {} after {} attempts",
                                    endpoint, attempts
                                );
                            }
                            return Ok(value);
                        }
                        Err(e) => {
                            self.record_failure(&ep);
                            self.discard(session).await;
                            e
                        }
                    }
                }
                Err(e @ PoolError::CircuitOpen { .. }) => {
                    error!(
                        "Circuit breaker OPEN for {} on attempt {}",
                        endpoint, attempts
                    );
                    return Err(e);
                }
                // Connect failures were already recorded by acquire
                Err(PoolError::Device { source, .. })
                | Err(PoolError::RetriesExhausted { source, .. }) => source,
            };

            warn!(
                "Attempt {}/{} failed for {}: {}",
                attempts, max_attempts, endpoint, outcome
            );
            if !outcome.is_retryable() {
                debug!("Error is not retryable, aborting");
                return Err(PoolError::Device {
                    endpoint: endpoint.clone(),
                    source: outcome,
                });
            }
            last_error = Some(outcome);

            if attempts < max_attempts {
                let delay = retry.calculate_delay(attempt);
                info!("Waiting {:?} before retry {} for {}", delay, attempts + 1, endpoint);
                sleep(delay).await;
            }
        }

        let source = last_error
            .unwrap_or_else(|| DeviceError::Command("no attempt was made".to_string()));
        error!(
            "All {} attempts failed for {}. Final error: {}",
            attempts, endpoint, source
        );

        if ep.breaker.force_open() {
            warn!(
                "Forced circuit breaker to OPEN for {} after retry exhaustion",
                endpoint
            );
        }

        Err(PoolError::RetriesExhausted {
            endpoint: endpoint.clone(),
            attempts,
            source,
        })
    }

    /// Liveness check of one endpoint, run through [`execute`](Self::execute)
    /// so its outcome feeds the breaker and health record like any operation.
    pub async fn check(
        &self,
        endpoint: &EndpointKey,
        credentials: &Credentials,
    ) -> Result<(), PoolError> {
        self.execute(endpoint, credentials, |session| {
            Box::pin(async move { session.probe().await })
        })
        .await
    }
}
