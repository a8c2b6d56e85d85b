//! API Handlers
//!
//! HTTP request handlers for the tile endpoint and the admin endpoints.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{Method, Uri},
    Json,
};
use tokio::sync::RwLock;
use tracing::debug;

use crate::cache::{CacheKey, CacheStore};
use crate::config::Config;
use crate::error::{ProxyError, Result};
use crate::models::{HealthResponse, PurgeResponse, StatsResponse};
use crate::proxy::{TileProxy, TileResponse};
use crate::tile::TileRouter;
use crate::upstream::{HttpBackend, TileBackend, UpstreamError};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub proxy: TileProxy,
    pub router: TileRouter,
}

impl AppState {
    pub fn new(proxy: TileProxy, router: TileRouter) -> Self {
        Self { proxy, router }
    }

    /// Creates a new AppState from configuration.
    ///
    /// Builds the cache store, the HTTP backend and the router from the
    /// Config. Fails only if the HTTP client cannot be constructed.
    pub fn from_config(config: &Config) -> std::result::Result<Self, UpstreamError> {
        let backend = HttpBackend::new(
            config.upstream_url.clone(),
            Duration::from_secs(config.upstream_timeout),
        )?
        .with_max_body_bytes(config.max_body_bytes);
        Ok(Self::with_backend(config, Arc::new(backend)))
    }

    /// Same as [`AppState::from_config`] with a caller-supplied backend.
    pub fn with_backend(config: &Config, backend: Arc<dyn TileBackend>) -> Self {
        let store = CacheStore::new(
            config.max_cache_bytes,
            Duration::from_secs(config.stale_window),
        );
        let proxy = TileProxy::new(
            Arc::new(RwLock::new(store)),
            backend,
            config.ttl_policy(),
            Duration::from_secs(config.lock_timeout),
        );
        Self::new(proxy, TileRouter::new(config.styles.clone()))
    }
}

/// Handler for GET /styles/{style}/{z}/{x}/{y}(@2x|@3x)?.png
///
/// Anything that fails routing is a 404 and never reaches upstream.
pub async fn tile_handler(State(state): State<AppState>, uri: Uri) -> Result<TileResponse> {
    let tile = state
        .router
        .route(uri.path(), uri.query())
        .map_err(|rejection| {
            debug!(path = uri.path(), %rejection, "Rejected tile request");
            ProxyError::NotFound(uri.path().to_string())
        })?;

    state.proxy.serve(tile).await
}

/// Handler for DELETE /purge/styles/...
///
/// Removes one cached tile. The path after `/purge` goes through the same
/// router as tile requests, so it resolves to the same key.
pub async fn purge_handler(
    State(state): State<AppState>,
    Path(path): Path<String>,
    uri: Uri,
) -> Result<Json<PurgeResponse>> {
    let tile_path = format!("/{}", path);
    let tile = state
        .router
        .route(&tile_path, uri.query())
        .map_err(|_| ProxyError::NotFound(tile_path.clone()))?;
    let key = CacheKey::for_tile(&Method::GET, &tile);

    let removed = state.proxy.store().write().await.invalidate(&key);
    if !removed {
        return Err(ProxyError::NotFound(key.to_string()));
    }

    debug!(key = %key, "Purged cache entry");
    Ok(Json(PurgeResponse::new(key.as_str())))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let stats = state.proxy.store().read().await.stats();
    let coalescer = state.proxy.coalescer();

    Json(StatsResponse::new(
        &stats,
        state.proxy.upstream_fetches(),
        coalescer.stats(),
        coalescer.in_flight_count(),
    ))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

/// Fallback for every unmatched path.
pub async fn not_found_handler(uri: Uri) -> ProxyError {
    ProxyError::NotFound(uri.path().to_string())
}
