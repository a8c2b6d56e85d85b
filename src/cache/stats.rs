//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, misses, and evictions.

use serde::Serialize;

// == Cache Stats ==
/// Tracks cache performance metrics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Lookups answered by a fresh entry
    pub hits: u64,
    /// Lookups with no entry at all
    pub misses: u64,
    /// Lookups that found only an expired entry
    pub expired: u64,
    /// Responses served from an expired entry after an upstream failure
    pub stale_served: u64,
    /// Entries evicted to stay within the byte budget
    pub evictions: u64,
    /// Responses not stored because they exceed the whole budget
    pub oversized: u64,
    /// Current number of entries in the cache
    pub total_entries: usize,
    /// Current bytes charged against the budget
    pub total_bytes: u64,
    /// Configured byte budget
    pub max_bytes: u64,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new(max_bytes: u64) -> Self {
        Self {
            max_bytes,
            ..Self::default()
        }
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses + expired), or 0.0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses + self.expired;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_expired(&mut self) {
        self.expired += 1;
    }

    pub fn record_stale_served(&mut self) {
        self.stale_served += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn record_oversized(&mut self) {
        self.oversized += 1;
    }

    // == Update Occupancy ==
    /// Updates the entry count and byte usage.
    pub fn set_occupancy(&mut self, entries: usize, bytes: u64) {
        self.total_entries = entries;
        self.total_bytes = bytes;
    }
}
