use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

use super::endpoint::{Endpoint, IdleSession, Orphan};
use crate::device::EndpointKey;

/// A session leased from the pool.
///
/// The holder has exclusive use of the session until it hands it back with
/// [`ConnectionPool::release`](super::ConnectionPool::release) or
/// [`ConnectionPool::discard`](super::ConnectionPool::discard). A lease that is
/// simply dropped gives up its pool slot at once and leaves the session to be
/// disconnected by the next cleanup sweep.
pub struct PooledSession<S> {
    id: u64,
    pooled: bool,
    generation: u64,
    created_at: Instant,
    last_used: Instant,
    leased_at: Instant,
    endpoint: Arc<Endpoint<S>>,
    // Only `None` after the lease was handed back
    session: Option<S>,
}

impl<S> PooledSession<S> {
    pub(crate) fn from_idle(idle: IdleSession<S>, endpoint: Arc<Endpoint<S>>) -> Self {
        Self {
            id: idle.id,
            pooled: true,
            generation: idle.generation,
            created_at: idle.created_at,
            last_used: idle.last_used,
            leased_at: Instant::now(),
            endpoint,
            session: Some(idle.session),
        }
    }

    pub(crate) fn fresh(
        id: u64,
        session: S,
        endpoint: Arc<Endpoint<S>>,
        pooled: bool,
        generation: u64,
    ) -> Self {
        let now = Instant::now();
        Self {
            id,
            pooled,
            generation,
            created_at: now,
            last_used: now,
            leased_at: now,
            endpoint,
            session: Some(session),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// False for a temporary session created while the pool was full
    pub fn is_pooled(&self) -> bool {
        self.pooled
    }

    pub fn endpoint(&self) -> &EndpointKey {
        &self.endpoint.key
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// When the session was last handed back to the pool (or opened)
    pub fn last_used(&self) -> Instant {
        self.last_used
    }

    pub fn time_in_use(&self) -> Duration {
        self.leased_at.elapsed()
    }

    pub(crate) fn mark_used(&mut self) {
        self.last_used = Instant::now();
    }

    /// Hand the session back, disarming the orphan handling in `Drop`
    pub(crate) fn into_parts(mut self) -> (S, LeaseInfo<S>) {
        let session = self
            .session
            .take()
            .expect("BUG: PooledSession handed back twice");
        let info = LeaseInfo {
            id: self.id,
            pooled: self.pooled,
            generation: self.generation,
            created_at: self.created_at,
            endpoint: Arc::clone(&self.endpoint),
        };
        (session, info)
    }
}

impl<S> fmt::Debug for PooledSession<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledSession")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint.key)
            .field("pooled", &self.pooled)
            .field("time_in_use", &self.time_in_use())
            .finish()
    }
}

/// Bookkeeping of a lease that was handed back
pub(crate) struct LeaseInfo<S> {
    pub id: u64,
    pub pooled: bool,
    pub generation: u64,
    pub created_at: Instant,
    pub endpoint: Arc<Endpoint<S>>,
}

impl<S> Deref for PooledSession<S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.session
            .as_ref()
            .expect("BUG: PooledSession used after it was handed back")
    }
}

impl<S> DerefMut for PooledSession<S> {
    fn deref_mut(&mut self) -> &mut S {
        self.session
            .as_mut()
            .expect("BUG: PooledSession used after it was handed back")
    }
}

impl<S> Drop for PooledSession<S> {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        warn!(
            "Session {} to {} dropped without release, parking it for cleanup",
            self.id, self.endpoint.key
        );
        let mut slots = self.endpoint.slots();
        if self.pooled {
            slots.checked_out.remove(&self.id);
        }
        slots.orphans.push(Orphan {
            id: self.id,
            session,
        });
    }
}
