//! LRU Tracker Module
//!
//! Implements Least Recently Used ordering for byte-budget eviction.

use std::collections::{BTreeMap, HashMap};

use crate::cache::CacheKey;

/// Position of a key in eviction order: `(last_access, insertion_seq)`.
///
/// `last_access` comes from a logical clock ticked on every access, so the
/// lowest position is the least recently used key and equal access times
/// fall back to the oldest insertion.
type Position = (u64, u64);

// == LRU Tracker ==
/// Tracks access order for LRU eviction strategy.
#[derive(Debug, Default)]
pub struct LruTracker {
    /// Keys ordered from least to most recently used
    order: BTreeMap<Position, CacheKey>,
    /// Current position of every tracked key
    positions: HashMap<CacheKey, Position>,
    /// Logical access clock
    clock: u64,
    /// Next insertion sequence number
    next_seq: u64,
}

impl LruTracker {
    // == Constructor ==
    /// Creates a new empty LRU tracker.
    pub fn new() -> Self {
        Self::default()
    }

    // == Insert ==
    /// Records a store of `key`. A re-inserted key counts as a new insertion.
    pub fn insert(&mut self, key: &CacheKey) {
        self.remove(key);
        let seq = self.next_seq;
        self.next_seq += 1;
        let position = (self.tick(), seq);
        self.order.insert(position, key.clone());
        self.positions.insert(key.clone(), position);
    }

    // == Touch ==
    /// Marks a key as recently used, keeping its insertion sequence.
    ///
    /// Untracked keys are ignored.
    pub fn touch(&mut self, key: &CacheKey) {
        let Some(&old) = self.positions.get(key) else {
            return;
        };
        self.order.remove(&old);
        let position = (self.tick(), old.1);
        self.order.insert(position, key.clone());
        self.positions.insert(key.clone(), position);
    }

    // == Remove ==
    /// Removes a key from the tracker. Returns true if it was tracked.
    pub fn remove(&mut self, key: &CacheKey) -> bool {
        match self.positions.remove(key) {
            Some(position) => {
                self.order.remove(&position);
                true
            }
            None => false,
        }
    }

    // == Evict Oldest ==
    /// Returns and removes the least recently used key.
    pub fn evict_oldest(&mut self) -> Option<CacheKey> {
        let (_, key) = self.order.pop_first()?;
        self.positions.remove(&key);
        Some(key)
    }

    // == Peek Oldest ==
    /// Returns the least recently used key without removing it.
    pub fn peek_oldest(&self) -> Option<&CacheKey> {
        self.order.values().next()
    }

    /// Logical time of the last access to `key`.
    pub fn last_access(&self, key: &CacheKey) -> Option<u64> {
        self.positions.get(key).map(|(access, _)| *access)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.positions.contains_key(key)
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Places `key` at an explicit access time, for tie-break tests.
    #[cfg(test)]
    fn insert_with_access(&mut self, key: &CacheKey, access: u64) {
        self.remove(key);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert((access, seq), key.clone());
        self.positions.insert(key.clone(), (access, seq));
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> CacheKey {
        CacheKey::from(name)
    }

    #[test]
    fn test_lru_new() {
        let lru = LruTracker::new();
        assert!(lru.is_empty());
        assert_eq!(lru.len(), 0);
        assert!(lru.peek_oldest().is_none());
    }

    #[test]
    fn test_lru_insert_order() {
        let mut lru = LruTracker::new();

        lru.insert(&key("a"));
        lru.insert(&key("b"));
        lru.insert(&key("c"));

        assert_eq!(lru.len(), 3);
        assert_eq!(lru.peek_oldest(), Some(&key("a")));
    }

    #[test]
    fn test_lru_touch_moves_to_back_of_eviction_queue() {
        let mut lru = LruTracker::new();

        lru.insert(&key("a"));
        lru.insert(&key("b"));
        lru.insert(&key("c"));
        lru.touch(&key("a"));

        assert_eq!(lru.evict_oldest(), Some(key("b")));
        assert_eq!(lru.evict_oldest(), Some(key("c")));
        assert_eq!(lru.evict_oldest(), Some(key("a")));
        assert_eq!(lru.evict_oldest(), None);
    }

    #[test]
    fn test_lru_touch_untracked_is_noop() {
        let mut lru = LruTracker::new();
        lru.touch(&key("ghost"));
        assert!(lru.is_empty());
    }

    #[test]
    fn test_lru_reinsert_counts_as_new() {
        let mut lru = LruTracker::new();

        lru.insert(&key("a"));
        lru.insert(&key("b"));
        lru.insert(&key("a"));

        assert_eq!(lru.len(), 2);
        assert_eq!(lru.peek_oldest(), Some(&key("b")));
    }

    #[test]
    fn test_lru_remove() {
        let mut lru = LruTracker::new();

        lru.insert(&key("a"));
        lru.insert(&key("b"));

        assert!(lru.remove(&key("a")));
        assert!(!lru.remove(&key("a")));
        assert!(!lru.contains(&key("a")));
        assert_eq!(lru.len(), 1);
    }

    #[test]
    fn test_lru_last_access_advances() {
        let mut lru = LruTracker::new();

        lru.insert(&key("a"));
        let before = lru.last_access(&key("a")).unwrap();
        lru.touch(&key("a"));
        let after = lru.last_access(&key("a")).unwrap();

        assert!(after > before);
        assert!(lru.last_access(&key("missing")).is_none());
    }

    #[test]
    fn test_lru_ties_evict_oldest_insertion() {
        let mut lru = LruTracker::new();

        lru.insert_with_access(&key("first"), 7);
        lru.insert_with_access(&key("second"), 7);
        lru.insert_with_access(&key("recent"), 9);

        assert_eq!(lru.evict_oldest(), Some(key("first")));
        assert_eq!(lru.evict_oldest(), Some(key("second")));
        assert_eq!(lru.evict_oldest(), Some(key("recent")));
    }
}
