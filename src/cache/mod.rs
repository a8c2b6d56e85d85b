//! Cache Module
//!
//! Byte-bounded tile response cache with TTL-by-status and LRU eviction.

mod entry;
mod key;
mod lru;
mod stats;
mod store;
mod ttl;


// Re-export public types
pub use entry::{current_timestamp_ms, CacheEntry, ResponseHeaders};
pub use key::CacheKey;
pub use lru::LruTracker;
pub use stats::CacheStats;
pub use store::{CacheStore, Lookup, PutOutcome};
pub use ttl::{TtlClass, TtlPolicy, DEFAULT_TTL_NOT_FOUND, DEFAULT_TTL_OK, DEFAULT_TTL_OTHER};

// == Public Constants ==
/// Default byte budget (10 GiB)
pub const DEFAULT_MAX_CACHE_BYTES: u64 = 10 * 1024 * 1024 * 1024;
