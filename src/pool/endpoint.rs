//! Per-endpoint state: breaker, health counters and the session slots.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use crate::device::EndpointKey;
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, HealthMonitor, PoolMetrics};

/// A pooled session sitting in the pool, not leased to anyone.
pub(crate) struct IdleSession<S> {
    pub id: u64,
    pub session: S,
    pub created_at: Instant,
    pub last_used: Instant,
    pub generation: u64,
}

impl<S> IdleSession<S> {
    pub fn is_expired(&self, now: Instant, idle_timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_used) > idle_timeout
    }
}

/// A leased session whose holder dropped it without giving it back.
pub(crate) struct Orphan<S> {
    pub id: u64,
    pub session: S,
}

pub(crate) struct Slots<S> {
    /// Front is the least recently returned session
    pub idle: VecDeque<IdleSession<S>>,
    /// Pooled sessions currently out of `idle`: leased, or being probed by a sweep
    pub checked_out: HashSet<u64>,
    /// Pooled connects in flight
    pub reserved: usize,
    pub orphans: Vec<Orphan<S>>,
    /// Bumped by `close_all`; pooled leases from an older generation are not taken back
    pub generation: u64,
}

impl<S> Slots<S> {
    fn new() -> Self {
        Self {
            idle: VecDeque::new(),
            checked_out: HashSet::new(),
            reserved: 0,
            orphans: Vec::new(),
            generation: 0,
        }
    }

    /// Sessions counted against `max_connections`
    pub fn pooled_count(&self) -> usize {
        self.idle.len() + self.checked_out.len() + self.reserved
    }

    /// Remove every idle-expired session, then check out the least recently returned one.
    pub fn checkout(
        &mut self,
        now: Instant,
        idle_timeout: Duration,
    ) -> (Vec<IdleSession<S>>, Option<IdleSession<S>>) {
        let expired = self.take_expired(now, idle_timeout);
        let candidate = self.idle.pop_front();
        if let Some(idle) = &candidate {
            self.checked_out.insert(idle.id);
        }
        (expired, candidate)
    }

    pub fn take_expired(&mut self, now: Instant, idle_timeout: Duration) -> Vec<IdleSession<S>> {
        let (expired, fresh): (Vec<_>, Vec<_>) = self
            .idle
            .drain(..)
            .partition(|idle| idle.is_expired(now, idle_timeout));
        self.idle = fresh.into();
        expired
    }

    /// Put a checked-out session back, keeping `idle` ordered by last use.
    ///
    /// Returns the session when it no longer belongs to the pool.
    pub fn check_in(&mut self, idle: IdleSession<S>) -> Option<IdleSession<S>> {
        if !self.checked_out.remove(&idle.id) || idle.generation != self.generation {
            return Some(idle);
        }
        let pos = self.idle.partition_point(|s| s.last_used <= idle.last_used);
        self.idle.insert(pos, idle);
        None
    }
}

pub(crate) struct Endpoint<S> {
    pub key: EndpointKey,
    pub breaker: CircuitBreaker,
    pub health: HealthMonitor,
    slots: Mutex<Slots<S>>,
}

impl<S> Endpoint<S> {
    pub fn new(key: EndpointKey, config: CircuitBreakerConfig, metrics: Arc<PoolMetrics>) -> Self {
        Self {
            key,
            breaker: CircuitBreaker::with_config(config).with_metrics(metrics),
            health: HealthMonitor::new(),
            slots: Mutex::new(Slots::new()),
        }
    }

    pub fn slots(&self) -> MutexGuard<'_, Slots<S>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim a pooled slot for a new connection, if the pool has room
    pub fn try_reserve(self: &Arc<Self>, max_connections: usize) -> Option<SlotReservation<S>> {
        let mut slots = self.slots();
        if slots.pooled_count() >= max_connections {
            return None;
        }
        slots.reserved += 1;
        Some(SlotReservation {
            endpoint: Arc::clone(self),
            generation: slots.generation,
            armed: true,
        })
    }
}

/// A claimed pooled slot. Dropping it without `commit` gives the slot back.
pub(crate) struct SlotReservation<S> {
    endpoint: Arc<Endpoint<S>>,
    generation: u64,
    armed: bool,
}

impl<S> SlotReservation<S> {
    /// Turn the reservation into a checked-out pooled session; returns its generation
    pub fn commit(mut self, id: u64) -> u64 {
        let mut slots = self.endpoint.slots();
        slots.reserved = slots.reserved.saturating_sub(1);
        slots.checked_out.insert(id);
        self.armed = false;
        self.generation
    }
}

impl<S> Drop for SlotReservation<S> {
    fn drop(&mut self) {
        if self.armed {
            let mut slots = self.endpoint.slots();
            slots.reserved = slots.reserved.saturating_sub(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle(id: u64, last_used: Instant) -> IdleSession<()> {
        IdleSession {
            id,
            session: (),
            created_at: last_used,
            last_used,
            generation: 0,
        }
    }

    fn endpoint() -> Arc<Endpoint<()>> {
        Arc::new(Endpoint::new(
            EndpointKey::new("10.0.0.1", 8728),
            CircuitBreakerConfig::default(),
            Arc::new(PoolMetrics::new()),
        ))
    }

    #[test]
    fn test_checkout_purges_expired_first() {
        let now = Instant::now();
        let mut slots = Slots::new();
        slots.idle.push_back(idle(1, now));
        slots.idle.push_back(idle(2, now + Duration::from_secs(100)));

        let later = now + Duration::from_secs(61);
        let (expired, candidate) = slots.checkout(later, Duration::from_secs(60));

        assert_eq!(expired.iter().map(|s| s.id).collect::<Vec<_>>(), vec![1]);
        assert_eq!(candidate.map(|s| s.id), Some(2));
        assert!(slots.checked_out.contains(&2));
        assert_eq!(slots.pooled_count(), 1);
    }

    #[test]
    fn test_check_in_keeps_lru_order() {
        let now = Instant::now();
        let mut slots = Slots::new();
        slots.idle.push_back(idle(1, now));
        slots.idle.push_back(idle(3, now + Duration::from_secs(20)));
        slots.checked_out.insert(2);

        assert!(slots.check_in(idle(2, now + Duration::from_secs(10))).is_none());
        let order: Vec<_> = slots.idle.iter().map(|s| s.id).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn test_check_in_rejects_stale_generation() {
        let mut slots = Slots::new();
        slots.checked_out.insert(1);
        slots.generation = 1;

        let returned = slots.check_in(idle(1, Instant::now()));
        assert!(returned.is_some());
        assert!(slots.idle.is_empty());
        assert!(slots.checked_out.is_empty());
    }

    #[test]
    fn test_reservation_respects_capacity_and_releases_on_drop() {
        let ep = endpoint();

        let first = ep.try_reserve(2).unwrap();
        let second = ep.try_reserve(2).unwrap();
        assert!(ep.try_reserve(2).is_none());

        drop(first);
        assert_eq!(ep.slots().pooled_count(), 1);

        second.commit(42);
        let slots = ep.slots();
        assert_eq!(slots.reserved, 0);
        assert!(slots.checked_out.contains(&42));
        assert_eq!(slots.pooled_count(), 1);
    }
}
