//! Response DTOs for the tile cache admin API
//!
//! Defines the structure of outgoing JSON bodies. Tile responses are raw
//! bytes and do not go through these types.

use serde::Serialize;

use crate::cache::CacheStats;
use crate::proxy::CoalescerStats;

/// Response body for the purge operation (DELETE /purge/styles/...)
#[derive(Debug, Clone, Serialize)]
pub struct PurgeResponse {
    /// Success message
    pub message: String,
    /// The cache key that was removed
    pub key: String,
}

impl PurgeResponse {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' purged successfully", key),
            key,
        }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Lookups that found an expired entry
    pub expired: u64,
    /// Responses served from stale entries
    pub stale_served: u64,
    /// Number of evictions
    pub evictions: u64,
    /// Responses too large to cache
    pub oversized: u64,
    /// Current number of entries in cache
    pub total_entries: usize,
    /// Bytes currently charged against the budget
    pub total_bytes: u64,
    /// Configured byte budget
    pub max_bytes: u64,
    /// Hit rate (hits / lookups)
    pub hit_rate: f64,
    /// Requests actually sent to the backend
    pub upstream_fetches: u64,
    /// Requests that started a fetch, including ones answered by a
    /// concurrent fill without calling the backend
    pub fetch_leaders: u64,
    /// Requests that waited on another request's fetch
    pub coalesced_requests: u64,
    /// Fetches currently running
    pub in_flight: usize,
}

impl StatsResponse {
    /// Creates a new StatsResponse from cache and coalescer statistics
    pub fn new(
        stats: &CacheStats,
        upstream_fetches: u64,
        coalescer: CoalescerStats,
        in_flight: usize,
    ) -> Self {
        Self {
            hits: stats.hits,
            misses: stats.misses,
            expired: stats.expired,
            stale_served: stats.stale_served,
            evictions: stats.evictions,
            oversized: stats.oversized,
            total_entries: stats.total_entries,
            total_bytes: stats.total_bytes,
            max_bytes: stats.max_bytes,
            hit_rate: stats.hit_rate(),
            upstream_fetches,
            fetch_leaders: coalescer.leaders,
            coalesced_requests: coalescer.followers,
            in_flight,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
