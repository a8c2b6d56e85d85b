//! Proxy Module
//!
//! Ties the cache store, the coalescer and the upstream backend together
//! into the read-through tile cache.

mod coalesce;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Method},
    response::{IntoResponse, Response},
};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

use crate::cache::{CacheEntry, CacheKey, CacheStore, Lookup, PutOutcome, TtlPolicy};
use crate::error::{ProxyError, Result};
use crate::tile::TileRequest;
use crate::upstream::{TileBackend, UpstreamError, UpstreamResponse};

pub use coalesce::{CoalescerStats, FetchOutcome, FlightGuard, Registration, RequestCoalescer};

/// Response header carrying the [`CacheStatus`].
pub const X_CACHE_STATUS: HeaderName = HeaderName::from_static("x-cache-status");

/// Cache store shared between handlers and background tasks.
pub type SharedStore = Arc<RwLock<CacheStore>>;

// == Cache Status ==
/// How a response was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Served from a fresh entry
    Hit,
    /// Nothing cached; fetched from upstream
    Miss,
    /// Cached entry had expired; refreshed from upstream
    Expired,
    /// Upstream failed; served from an expired entry
    Stale,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
            CacheStatus::Expired => "EXPIRED",
            CacheStatus::Stale => "STALE",
        }
    }
}

// == Tile Response ==
/// A cached (or freshly fetched) entry together with its cache status.
#[derive(Debug, Clone)]
pub struct TileResponse {
    pub entry: Arc<CacheEntry>,
    pub cache_status: CacheStatus,
}

impl TileResponse {
    pub fn new(entry: Arc<CacheEntry>, cache_status: CacheStatus) -> Self {
        Self {
            entry,
            cache_status,
        }
    }
}

impl IntoResponse for TileResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.entry.body.clone()));
        *response.status_mut() = self.entry.status;

        let headers = response.headers_mut();
        for (name, value) in self.entry.headers.iter() {
            headers.insert(name.clone(), value.clone());
        }
        headers.insert(
            X_CACHE_STATUS,
            HeaderValue::from_static(self.cache_status.as_str()),
        );
        response
    }
}

// == Tile Proxy ==
/// Read-through cache in front of a [`TileBackend`]. Cheap to clone.
#[derive(Clone)]
pub struct TileProxy {
    store: SharedStore,
    coalescer: Arc<RequestCoalescer>,
    backend: Arc<dyn TileBackend>,
    /// Requests actually sent to the backend
    upstream_fetches: Arc<AtomicU64>,
    ttl: TtlPolicy,
    /// Longest a caller waits on an in-flight fetch
    lock_timeout: Duration,
}

impl TileProxy {
    pub fn new(
        store: SharedStore,
        backend: Arc<dyn TileBackend>,
        ttl: TtlPolicy,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            store,
            coalescer: Arc::new(RequestCoalescer::new()),
            backend,
            upstream_fetches: Arc::new(AtomicU64::new(0)),
            ttl,
            lock_timeout,
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn coalescer(&self) -> &RequestCoalescer {
        &self.coalescer
    }

    pub fn upstream_fetches(&self) -> u64 {
        self.upstream_fetches.load(Ordering::Relaxed)
    }

    pub fn ttl_policy(&self) -> TtlPolicy {
        self.ttl
    }

    // == Serve ==
    /// Answers a routed tile request from cache, or through a single
    /// coalesced upstream fetch.
    ///
    /// Dropping the returned future only abandons this caller's wait; the
    /// fetch runs in its own task and still populates the cache.
    pub async fn serve(&self, tile: TileRequest) -> Result<TileResponse> {
        let key = CacheKey::for_tile(&Method::GET, &tile);

        let saw_expired = match self.store.write().await.lookup(&key) {
            Lookup::Fresh(entry) => {
                debug!(key = %key, "Cache hit");
                return Ok(TileResponse::new(entry, CacheStatus::Hit));
            }
            Lookup::Expired(_) => true,
            Lookup::Miss => false,
        };

        let mut receiver = match self.coalescer.join(&key) {
            Registration::Leader { guard, receiver } => {
                self.spawn_fetch(tile, guard);
                receiver
            }
            Registration::Follower(receiver) => receiver,
        };

        match tokio::time::timeout(self.lock_timeout, receiver.recv()).await {
            Ok(Ok(FetchOutcome::Fetched(entry))) => {
                let status = if saw_expired {
                    CacheStatus::Expired
                } else {
                    CacheStatus::Miss
                };
                Ok(TileResponse::new(entry, status))
            }
            Ok(Ok(FetchOutcome::Stale(entry))) => {
                self.store.write().await.record_stale_served();
                Ok(TileResponse::new(entry, CacheStatus::Stale))
            }
            Ok(Ok(FetchOutcome::Failed(err))) => Err(err.into()),
            Ok(Err(broadcast::error::RecvError::Closed)) => {
                self.stale_or(&key, ProxyError::Internal("upstream fetch aborted".to_string()))
                    .await
            }
            Ok(Err(broadcast::error::RecvError::Lagged(_))) => {
                self.stale_or(&key, ProxyError::Internal("fetch outcome lost".to_string()))
                    .await
            }
            Err(_elapsed) => {
                warn!(
                    key = %key,
                    timeout = ?self.lock_timeout,
                    "Timed out waiting for in-flight fetch"
                );
                let err = UpstreamError::Timeout(self.lock_timeout);
                self.stale_or(&key, err.into()).await
            }
        }
    }

    /// Serves a stale entry for `key` if one exists, otherwise fails with `err`.
    async fn stale_or(&self, key: &CacheKey, err: ProxyError) -> Result<TileResponse> {
        let mut store = self.store.write().await;
        match store.stale(key) {
            Some(entry) => {
                store.record_stale_served();
                Ok(TileResponse::new(entry, CacheStatus::Stale))
            }
            None => Err(err),
        }
    }

    fn spawn_fetch(&self, tile: TileRequest, guard: FlightGuard) {
        let store = Arc::clone(&self.store);
        let backend = Arc::clone(&self.backend);
        let fetches = Arc::clone(&self.upstream_fetches);
        let ttl = self.ttl;
        tokio::spawn(async move {
            let upstream = Upstream {
                backend: backend.as_ref(),
                fetches: &fetches,
                ttl,
            };
            let outcome = fetch_and_store(&store, upstream, guard.key(), &tile).await;
            guard.complete(outcome);
        });
    }
}

/// What a leader's fetch task needs besides the store.
#[derive(Clone, Copy)]
struct Upstream<'a> {
    backend: &'a dyn TileBackend,
    fetches: &'a AtomicU64,
    ttl: TtlPolicy,
}

/// Fetches `tile` and caches the response according to the TTL policy.
async fn fetch_and_store(
    store: &SharedStore,
    upstream: Upstream<'_>,
    key: &CacheKey,
    tile: &TileRequest,
) -> FetchOutcome {
    let ttl = upstream.ttl;

    // A previous leader may have filled the entry between lookup and join
    if let Some(entry) = store.read().await.peek(key) {
        return FetchOutcome::Fetched(entry);
    }

    upstream.fetches.fetch_add(1, Ordering::Relaxed);
    let err = match upstream.backend.fetch(tile).await {
        Ok(response) => {
            return FetchOutcome::Fetched(store_response(store, ttl, key, response).await);
        }
        Err(err) => err,
    };

    if let Some(entry) = store.read().await.stale(key) {
        warn!(key = %key, error = %err, "Upstream failed, serving stale entry");
        return FetchOutcome::Stale(entry);
    }

    match err {
        // A 5xx is still a response: cache it under its own status
        UpstreamError::BackendError(response) => {
            FetchOutcome::Fetched(store_response(store, ttl, key, response).await)
        }
        err => {
            warn!(key = %key, error = %err, "Upstream failed with nothing to serve");
            FetchOutcome::Failed(err)
        }
    }
}

async fn store_response(
    store: &SharedStore,
    ttl: TtlPolicy,
    key: &CacheKey,
    response: UpstreamResponse,
) -> Arc<CacheEntry> {
    let entry = Arc::new(CacheEntry::new(
        key.clone(),
        response.status,
        response.headers,
        response.body,
        ttl.ttl_for(response.status),
    ));

    match store.write().await.put(Arc::clone(&entry)) {
        PutOutcome::Stored { evicted } => {
            debug!(key = %key, status = entry.status.as_u16(), evicted, "Stored upstream response");
        }
        PutOutcome::TooLarge => {
            debug!(key = %key, size = entry.size_bytes, "Upstream response too large to cache");
        }
    }
    entry
}
