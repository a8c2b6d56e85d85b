//! Cache Store Module
//!
//! Main cache engine combining HashMap storage with LRU tracking, a byte
//! budget and TTL expiration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::cache::{current_timestamp_ms, CacheEntry, CacheKey, CacheStats, LruTracker};

// == Lookup ==
/// Result of a cache lookup.
#[derive(Debug, Clone)]
pub enum Lookup {
    /// Entry present and not yet expired
    Fresh(Arc<CacheEntry>),
    /// Entry present but past `expires_at`; kept for stale-on-error
    Expired(Arc<CacheEntry>),
    Miss,
}

// == Put Outcome ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// Stored after evicting `evicted` entries
    Stored { evicted: usize },
    /// Entry alone exceeds the budget; nothing was stored or evicted
    TooLarge,
}

// == Cache Store ==
/// Byte-bounded response cache with LRU eviction.
///
/// Invariant: `total_bytes <= max_bytes` after every operation.
#[derive(Debug)]
pub struct CacheStore {
    /// Cached responses
    entries: HashMap<CacheKey, Arc<CacheEntry>>,
    /// LRU access tracker
    lru: LruTracker,
    /// Performance statistics
    stats: CacheStats,
    /// Sum of `size_bytes` over stored entries
    total_bytes: u64,
    /// Byte budget
    max_bytes: u64,
    /// How long after expiry an entry may still be served on upstream failure
    stale_window: Duration,
}

impl CacheStore {
    // == Constructor ==
    /// Creates a new CacheStore.
    ///
    /// # Arguments
    /// * `max_bytes` - Maximum total size of stored entries
    /// * `stale_window` - How long expired entries stay usable for stale-on-error
    pub fn new(max_bytes: u64, stale_window: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            stats: CacheStats::new(max_bytes),
            total_bytes: 0,
            max_bytes,
            stale_window,
        }
    }

    // == Get ==
    /// Returns the entry if present and not expired. A hit refreshes its
    /// LRU position.
    pub fn get(&mut self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        match self.lookup(key) {
            Lookup::Fresh(entry) => Some(entry),
            Lookup::Expired(_) | Lookup::Miss => None,
        }
    }

    // == Lookup ==
    /// Like [`get`](Self::get), but reports an expired entry instead of
    /// hiding it. Expired entries are left in place.
    pub fn lookup(&mut self, key: &CacheKey) -> Lookup {
        self.lookup_at(key, current_timestamp_ms())
    }

    pub fn lookup_at(&mut self, key: &CacheKey, now: u64) -> Lookup {
        match self.entries.get(key) {
            Some(entry) if entry.is_expired_at(now) => {
                self.stats.record_expired();
                Lookup::Expired(Arc::clone(entry))
            }
            Some(entry) => {
                let entry = Arc::clone(entry);
                self.stats.record_hit();
                self.lru.touch(key);
                Lookup::Fresh(entry)
            }
            None => {
                self.stats.record_miss();
                Lookup::Miss
            }
        }
    }

    // == Peek ==
    /// Returns a fresh entry without touching statistics or LRU order.
    pub fn peek(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        let now = current_timestamp_ms();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired_at(now))
            .cloned()
    }

    // == Stale ==
    /// Returns an expired entry that is still within the stale window.
    pub fn stale(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        self.stale_at(key, current_timestamp_ms())
    }

    pub fn stale_at(&self, key: &CacheKey, now: u64) -> Option<Arc<CacheEntry>> {
        let window = window_ms(self.stale_window);
        self.entries
            .get(key)
            .filter(|entry| {
                entry
                    .expired_for_ms(now)
                    .is_some_and(|expired_for| expired_for < window)
            })
            .cloned()
    }

    /// Counts a response served from a stale entry.
    pub fn record_stale_served(&mut self) {
        self.stats.record_stale_served();
    }

    // == Put ==
    /// Stores an entry, replacing any entry under the same key.
    ///
    /// Least recently used entries are evicted first until the new entry
    /// fits. An entry larger than the whole budget is not stored and leaves
    /// the cache untouched.
    pub fn put(&mut self, entry: Arc<CacheEntry>) -> PutOutcome {
        let size = entry.size_bytes as u64;
        if size > self.max_bytes {
            self.stats.record_oversized();
            debug!(
                key = %entry.key,
                size,
                max_bytes = self.max_bytes,
                "Entry exceeds cache budget, not caching"
            );
            return PutOutcome::TooLarge;
        }

        let key = entry.key.clone();
        self.remove_entry(&key);

        let mut evicted = 0;
        while self.total_bytes + size > self.max_bytes {
            let Some(victim) = self.lru.evict_oldest() else {
                break;
            };
            if let Some(old) = self.entries.remove(&victim) {
                self.total_bytes -= old.size_bytes as u64;
                self.stats.record_eviction();
                evicted += 1;
                debug!(key = %victim, size = old.size_bytes, "Evicted LRU entry");
            }
        }

        self.total_bytes += size;
        self.entries.insert(key.clone(), entry);
        self.lru.insert(&key);
        self.sync_occupancy();

        PutOutcome::Stored { evicted }
    }

    // == Invalidate ==
    /// Removes an entry. Returns true if one was present.
    pub fn invalidate(&mut self, key: &CacheKey) -> bool {
        let removed = self.remove_entry(key);
        self.sync_occupancy();
        removed
    }

    // == Cleanup Expired ==
    /// Removes entries that expired longer ago than the stale window.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&mut self) -> usize {
        self.cleanup_expired_at(current_timestamp_ms())
    }

    pub fn cleanup_expired_at(&mut self, now: u64) -> usize {
        let window = window_ms(self.stale_window);
        let dead: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|(_, entry)| {
                entry
                    .expired_for_ms(now)
                    .is_some_and(|expired_for| expired_for >= window)
            })
            .map(|(key, _)| key.clone())
            .collect();

        for key in &dead {
            self.remove_entry(key);
        }
        self.sync_occupancy();
        dead.len()
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn stale_window(&self) -> Duration {
        self.stale_window
    }

    fn remove_entry(&mut self, key: &CacheKey) -> bool {
        match self.entries.remove(key) {
            Some(old) => {
                self.total_bytes -= old.size_bytes as u64;
                self.lru.remove(key);
                true
            }
            None => false,
        }
    }

    fn sync_occupancy(&mut self) {
        self.stats.set_occupancy(self.entries.len(), self.total_bytes);
    }

    /// Recomputes the byte total from the stored entries.
    #[cfg(test)]
    pub(crate) fn recomputed_bytes(&self) -> u64 {
        self.entries.values().map(|e| e.size_bytes as u64).sum()
    }
}

fn window_ms(window: Duration) -> u64 {
    u64::try_from(window.as_millis()).unwrap_or(u64::MAX)
}
