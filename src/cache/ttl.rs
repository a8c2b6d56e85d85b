//! TTL Policy Module
//!
//! Maps an upstream response status to the lifetime of its cache entry.

use std::time::Duration;

use axum::http::StatusCode;

// == Default TTLs ==
/// Lifetime of a 200 response (7 days).
pub const DEFAULT_TTL_OK: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Lifetime of a 404 response (1 hour).
pub const DEFAULT_TTL_NOT_FOUND: Duration = Duration::from_secs(60 * 60);

/// Lifetime of any other response (1 minute).
pub const DEFAULT_TTL_OTHER: Duration = Duration::from_secs(60);

/// Bucket a status falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TtlClass {
    Ok,
    NotFound,
    Other,
}

impl TtlClass {
    pub fn of(status: StatusCode) -> Self {
        match status {
            StatusCode::OK => TtlClass::Ok,
            StatusCode::NOT_FOUND => TtlClass::NotFound,
            _ => TtlClass::Other,
        }
    }
}

// == TTL Policy ==
/// Status-to-TTL table. Pure and immutable after startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    pub ok: Duration,
    pub not_found: Duration,
    pub other: Duration,
}

impl TtlPolicy {
    pub const fn new(ok: Duration, not_found: Duration, other: Duration) -> Self {
        Self {
            ok,
            not_found,
            other,
        }
    }

    pub fn ttl_for(&self, status: StatusCode) -> Duration {
        match TtlClass::of(status) {
            TtlClass::Ok => self.ok,
            TtlClass::NotFound => self.not_found,
            TtlClass::Other => self.other,
        }
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_TTL_OK, DEFAULT_TTL_NOT_FOUND, DEFAULT_TTL_OTHER)
    }
}
