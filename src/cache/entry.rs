//! Cache Entry Module
//!
//! Defines the cached tile response with its expiry metadata.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::body::Bytes;
use axum::http::{HeaderName, HeaderValue, StatusCode};

use crate::cache::CacheKey;

// == Response Headers ==
/// Ordered header list with case-insensitively unique names.
///
/// `HeaderName` is always lowercase, so name equality is case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHeaders(Vec<(HeaderName, HeaderValue)>);

impl ResponseHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a header, replacing the value in place if the name exists.
    pub fn insert(&mut self, name: HeaderName, value: HeaderValue) {
        match self.0.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.0
            .iter()
            .find(|(existing, _)| existing.as_str().eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.0.iter().map(|(name, value)| (name, value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sum of name and value lengths.
    pub fn byte_len(&self) -> usize {
        self.0
            .iter()
            .map(|(name, value)| name.as_str().len() + value.len())
            .sum()
    }
}

// == Cache Entry ==
/// A cached upstream response. Never mutated once built.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub status: StatusCode,
    pub headers: ResponseHeaders,
    pub body: Bytes,
    /// Storage timestamp (Unix milliseconds)
    pub stored_at: u64,
    /// Expiration timestamp (Unix milliseconds)
    pub expires_at: u64,
    /// Bytes charged against the cache budget
    pub size_bytes: usize,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates an entry stored now that lives for `ttl`.
    pub fn new(
        key: CacheKey,
        status: StatusCode,
        headers: ResponseHeaders,
        body: Bytes,
        ttl: Duration,
    ) -> Self {
        Self::new_at(key, status, headers, body, ttl, current_timestamp_ms())
    }

    /// Creates an entry as if stored at `now` (Unix milliseconds).
    pub fn new_at(
        key: CacheKey,
        status: StatusCode,
        headers: ResponseHeaders,
        body: Bytes,
        ttl: Duration,
        now: u64,
    ) -> Self {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        let size_bytes = key.len() + headers.byte_len() + body.len();

        Self {
            key,
            status,
            headers,
            body,
            stored_at: now,
            expires_at: now.saturating_add(ttl_ms),
            size_bytes,
        }
    }

    // == Is Expired ==
    /// An entry is expired once the current time reaches `expires_at`.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    pub fn is_expired_at(&self, now: u64) -> bool {
        now >= self.expires_at
    }

    /// Milliseconds since expiry at `now`, or None while still fresh.
    pub fn expired_for_ms(&self, now: u64) -> Option<u64> {
        self.is_expired_at(now).then(|| now - self.expires_at)
    }

    // == Time To Live ==
    /// Remaining lifetime in milliseconds, 0 once expired.
    pub fn ttl_remaining_ms(&self) -> u64 {
        self.expires_at.saturating_sub(current_timestamp_ms())
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
