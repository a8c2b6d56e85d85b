//! Request coalescing ("cache lock").
//!
//! When several requests miss the cache for the same key, only the first
//! one fetches from upstream; the others wait for its result.
//!
//! ```text
//! Request A ─┐
//!            │                               detached
//! Request B ─┼──► RequestCoalescer ───────► fetch task
//!            │        │                         │
//! Request C ─┘        ▼                         ▼
//!               [A, B, C all receive  ◄──── one outcome]
//! ```
//!
//! A key is IN_FLIGHT while it has a sender in the map and IDLE otherwise.
//! The leader gets a [`FlightGuard`]; completing or dropping it returns the
//! key to IDLE.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::cache::{CacheEntry, CacheKey};
use crate::upstream::UpstreamError;

// == Fetch Outcome ==
/// Result shared with every waiter on a key.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// Upstream answered; the entry is what was (or would have been) cached
    Fetched(Arc<CacheEntry>),
    /// Upstream failed and an expired entry is served instead
    Stale(Arc<CacheEntry>),
    /// Upstream failed and nothing could be served
    Failed(UpstreamError),
}

type InFlight = Arc<Mutex<HashMap<CacheKey, broadcast::Sender<FetchOutcome>>>>;

// == Registration ==
pub enum Registration {
    /// First caller for the key; must run the fetch and complete the guard
    Leader {
        guard: FlightGuard,
        receiver: broadcast::Receiver<FetchOutcome>,
    },
    /// A fetch is already running; wait on the receiver
    Follower(broadcast::Receiver<FetchOutcome>),
}

/// Statistics for monitoring coalescing effectiveness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoalescerStats {
    /// Requests that started an upstream fetch
    pub leaders: u64,
    /// Requests that waited on an existing fetch
    pub followers: u64,
}

// == Request Coalescer ==
/// Per-key in-flight tracking. Unrelated keys only share the brief map
/// lock, never a fetch.
#[derive(Debug, Default)]
pub struct RequestCoalescer {
    in_flight: InFlight,
    stats: Mutex<CoalescerStats>,
}

impl RequestCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    // == Join ==
    /// Registers interest in `key`.
    ///
    /// The receiver is subscribed while the map lock is held, so it cannot
    /// miss the outcome of the fetch it joined.
    pub fn join(&self, key: &CacheKey) -> Registration {
        let mut in_flight = lock(&self.in_flight);

        if let Some(sender) = in_flight.get(key) {
            let receiver = sender.subscribe();
            lock(&self.stats).followers += 1;
            debug!(key = %key, "Coalescing request onto in-flight fetch");
            return Registration::Follower(receiver);
        }

        // A single outcome is ever sent per channel
        let (sender, receiver) = broadcast::channel(1);
        in_flight.insert(key.clone(), sender.clone());
        lock(&self.stats).leaders += 1;
        debug!(key = %key, in_flight = in_flight.len(), "Starting upstream fetch");

        Registration::Leader {
            guard: FlightGuard {
                in_flight: Arc::clone(&self.in_flight),
                key: key.clone(),
                sender: Some(sender),
            },
            receiver,
        }
    }

    /// Returns true while a fetch for `key` is running.
    pub fn is_in_flight(&self, key: &CacheKey) -> bool {
        lock(&self.in_flight).contains_key(key)
    }

    pub fn in_flight_count(&self) -> usize {
        lock(&self.in_flight).len()
    }

    pub fn stats(&self) -> CoalescerStats {
        *lock(&self.stats)
    }
}

// == Flight Guard ==
/// Held by the leader's fetch. Moves the key back to IDLE on completion or
/// on drop.
#[derive(Debug)]
pub struct FlightGuard {
    in_flight: InFlight,
    key: CacheKey,
    sender: Option<broadcast::Sender<FetchOutcome>>,
}

impl FlightGuard {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Publishes the outcome to every waiter and releases the key.
    pub fn complete(mut self, outcome: FetchOutcome) {
        if let Some(sender) = self.sender.take() {
            self.release(&sender);
            // No receivers left is fine: every caller may have gone away
            let waiters = sender.send(outcome).unwrap_or(0);
            debug!(key = %self.key, waiters, "In-flight fetch completed");
        }
    }

    fn release(&self, sender: &broadcast::Sender<FetchOutcome>) {
        let mut in_flight = lock(&self.in_flight);
        if in_flight
            .get(&self.key)
            .is_some_and(|current| current.same_channel(sender))
        {
            in_flight.remove(&self.key);
        }
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if let Some(sender) = self.sender.take() {
            warn!(key = %self.key, "In-flight fetch dropped without an outcome");
            self.release(&sender);
        }
    }
}

/// The maps hold no invariants a panic could break, so poisoning is ignored.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
