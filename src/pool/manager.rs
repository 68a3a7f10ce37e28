use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::endpoint::{Endpoint, IdleSession};
use super::error::PoolError;
use super::report::CleanupStats;
use super::session::PooledSession;
use crate::config::PoolConfig;
use crate::device::{Credentials, DeviceConnector, DeviceSession, EndpointKey};
use crate::resilience::PoolMetrics;

/// Pool of device sessions, partitioned by endpoint.
///
/// Each endpoint gets its own circuit breaker, health counters and session
/// slots, each behind its own lock. No lock is held across a network call.
pub struct ConnectionPool<C: DeviceConnector> {
    connector: C,
    config: PoolConfig,
    endpoints: RwLock<HashMap<EndpointKey, Arc<Endpoint<C::Session>>>>,
    metrics: Arc<PoolMetrics>,
    next_id: AtomicU64,
}

impl<C: DeviceConnector> ConnectionPool<C> {
    pub fn new(connector: C, config: PoolConfig) -> Self {
        Self {
            connector,
            config,
            endpoints: RwLock::new(HashMap::new()),
            metrics: Arc::new(PoolMetrics::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn pool_config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<PoolMetrics> {
        &self.metrics
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Get or lazily create the state for an endpoint
    pub(crate) fn endpoint(&self, key: &EndpointKey) -> Arc<Endpoint<C::Session>> {
        if let Some(ep) = self
            .endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
        {
            return Arc::clone(ep);
        }

        let mut endpoints = self.endpoints.write().unwrap_or_else(PoisonError::into_inner);
        let ep = endpoints.entry(key.clone()).or_insert_with(|| {
            debug!("Tracking new endpoint {}", key);
            Arc::new(Endpoint::new(
                key.clone(),
                self.config.circuit_breaker.clone(),
                Arc::clone(&self.metrics),
            ))
        });
        Arc::clone(ep)
    }

    /// Endpoint state if it was ever referenced; never creates it
    pub(crate) fn known_endpoint(&self, key: &EndpointKey) -> Option<Arc<Endpoint<C::Session>>> {
        self.endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub(crate) fn all_endpoints(&self) -> Vec<Arc<Endpoint<C::Session>>> {
        let mut all: Vec<_> = self
            .endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        all
    }

    pub(crate) fn record_success(&self, ep: &Endpoint<C::Session>) {
        ep.breaker.record_success();
        ep.health.record_outcome(true);
    }

    pub(crate) fn record_failure(&self, ep: &Endpoint<C::Session>) {
        ep.breaker.record_failure();
        ep.health.record_outcome(false);
        self.metrics.record_failure();
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Lease a session for `endpoint`.
    ///
    /// Reuses the least recently returned idle session that passes a liveness
    /// probe, opens a new pooled session while the pool has room, and falls
    /// back to a temporary session when it does not. Fails fast with
    /// [`PoolError::CircuitOpen`] without touching the network when the
    /// endpoint's breaker rejects the request.
    pub async fn acquire(
        &self,
        endpoint: &EndpointKey,
        credentials: &Credentials,
    ) -> Result<PooledSession<C::Session>, PoolError> {
        let ep = self.endpoint(endpoint);

        if !ep.breaker.allow_request() {
            self.metrics.record_circuit_breaker_rejection();
            warn!("Circuit breaker OPEN for {}, connection rejected", endpoint);
            return Err(PoolError::CircuitOpen {
                endpoint: endpoint.clone(),
            });
        }

        loop {
            let (expired, candidate) = ep.slots().checkout(Instant::now(), self.config.idle_timeout);

            for idle in expired {
                warn!(
                    "Connection {} to {} expired after {:?} idle",
                    idle.id,
                    endpoint,
                    idle.last_used.elapsed()
                );
                self.close_session(endpoint, idle.session, "expired").await;
            }

            let Some(idle) = candidate else {
                break;
            };

            // The slot stays checked out while probing, so concurrent callers cannot overfill the pool
            self.metrics.record_lease();
            let mut lease = PooledSession::from_idle(idle, Arc::clone(&ep));
            match lease.probe().await {
                Ok(()) => {
                    debug!("Reusing healthy connection {} to {}", lease.id(), endpoint);
                    self.record_success(&ep);
                    return Ok(lease);
                }
                Err(e) => {
                    warn!("Unhealthy connection {} to {}: {}", lease.id(), endpoint, e);
                    self.record_failure(&ep);
                    self.discard(lease).await;
                }
            }
        }

        let reservation = ep.try_reserve(self.config.max_connections);
        let pooled = reservation.is_some();
        if !pooled {
            warn!(
                "Connection pool full for {}, creating temporary connection",
                endpoint
            );
        }

        let session = match self.connector.connect(endpoint, credentials).await {
            Ok(session) => session,
            Err(e) => {
                warn!("Failed to create connection to {}: {}", endpoint, e);
                self.record_failure(&ep);
                return Err(PoolError::Device {
                    endpoint: endpoint.clone(),
                    source: e,
                });
            }
        };

        let id = self.next_id();
        let generation = match reservation {
            Some(reservation) => reservation.commit(id),
            None => ep.slots().generation,
        };

        self.metrics.record_connection_created();
        self.metrics.record_lease();
        self.record_success(&ep);
        debug!(
            "Created new {} connection {} to {}",
            if pooled { "pooled" } else { "temporary" },
            id,
            endpoint
        );

        Ok(PooledSession::fresh(id, session, Arc::clone(&ep), pooled, generation))
    }

    /// Give a session back after use.
    ///
    /// Pooled sessions become the most recently used idle session; temporary
    /// sessions are always disconnected.
    pub async fn release(&self, mut lease: PooledSession<C::Session>) {
        lease.mark_used();
        let last_used = lease.last_used();
        let (session, info) = lease.into_parts();
        self.metrics.record_lease_end();

        if !info.pooled {
            self.close_session(&info.endpoint.key, session, "temporary").await;
            return;
        }

        let rejected = info.endpoint.slots().check_in(IdleSession {
            id: info.id,
            session,
            created_at: info.created_at,
            last_used,
            generation: info.generation,
        });

        match rejected {
            None => debug!("Returned connection {} to pool for {}", info.id, info.endpoint.key),
            Some(idle) => {
                self.close_session(&info.endpoint.key, idle.session, "retired").await;
            }
        }
    }

    /// Disconnect a leased session and free its slot; it is never pooled again.
    pub async fn discard(&self, lease: PooledSession<C::Session>) {
        let (session, info) = lease.into_parts();
        self.metrics.record_lease_end();
        if info.pooled {
            info.endpoint.slots().checked_out.remove(&info.id);
        }
        self.close_session(&info.endpoint.key, session, "discarded").await;
    }

    /// Disconnect every idle pooled session and every orphan; used at shutdown.
    ///
    /// Sessions leased right now are disconnected when they come back.
    pub async fn close_all(&self) -> usize {
        let mut closed = 0;
        for ep in self.all_endpoints() {
            let (idle, orphans) = {
                let mut slots = ep.slots();
                slots.generation += 1;
                let idle: Vec<_> = slots.idle.drain(..).collect();
                let orphans = std::mem::take(&mut slots.orphans);
                (idle, orphans)
            };

            info!("Cleaning up connections for {}", ep.key);
            for idle in idle {
                self.close_session(&ep.key, idle.session, "pooled").await;
                closed += 1;
            }
            for orphan in orphans {
                self.close_session(&ep.key, orphan.session, "orphaned").await;
                closed += 1;
            }
        }

        self.metrics.reset_active();
        info!("Connection cleanup complete. Closed {} connections.", closed);
        closed
    }

    /// Sweep every endpoint for expired, unhealthy and orphaned sessions.
    ///
    /// Idle sessions are probed, and each probe outcome is recorded against the
    /// endpoint's breaker and health record just like a probe during `acquire`.
    pub async fn cleanup_stale(&self) -> CleanupStats {
        let mut stats = CleanupStats::default();

        for ep in self.all_endpoints() {
            let (expired, candidates, orphans) = {
                let mut slots = ep.slots();
                let expired = slots.take_expired(Instant::now(), self.config.idle_timeout);
                let candidates: Vec<_> = slots.idle.drain(..).collect();
                for idle in &candidates {
                    slots.checked_out.insert(idle.id);
                }
                let orphans = std::mem::take(&mut slots.orphans);
                (expired, candidates, orphans)
            };

            for idle in expired {
                self.close_session(&ep.key, idle.session, "expired").await;
                stats.expired_connections += 1;
            }

            for mut idle in candidates {
                match idle.session.probe().await {
                    Ok(()) => {
                        self.record_success(&ep);
                        let retired = ep.slots().check_in(idle);
                        if let Some(retired) = retired {
                            self.close_session(&ep.key, retired.session, "retired").await;
                        }
                    }
                    Err(e) => {
                        warn!("Connection {} to {} failed probe: {}", idle.id, ep.key, e);
                        self.record_failure(&ep);
                        ep.slots().checked_out.remove(&idle.id);
                        self.close_session(&ep.key, idle.session, "unhealthy").await;
                        stats.unhealthy_connections += 1;
                    }
                }
            }

            for orphan in orphans {
                debug!("Reclaiming orphaned connection {} to {}", orphan.id, ep.key);
                self.close_session(&ep.key, orphan.session, "orphaned").await;
                self.metrics.record_lease_end();
                stats.orphaned_connections += 1;
            }
        }

        stats.total_cleaned =
            stats.expired_connections + stats.unhealthy_connections + stats.orphaned_connections;
        info!("Connection cleanup complete: {:?}", stats);
        stats
    }

    async fn close_session(&self, endpoint: &EndpointKey, mut session: C::Session, reason: &str) {
        match session.disconnect().await {
            Ok(()) => debug!("Closed {} connection to {}", reason, endpoint),
            Err(e) => warn!("Error closing {} connection to {}: {}", reason, endpoint, e),
        }
    }
}
