//! API Routes
//!
//! Configures the Axum router with the tile endpoint and admin endpoints.

use axum::{
    routing::{delete, get},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    health_handler, not_found_handler, purge_handler, stats_handler, tile_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /styles/{style}/{z}/{x}/{y}(@2x|@3x)?.png` - Cached tile
/// - `DELETE /purge/styles/...` - Drop one cached tile
/// - `GET /stats` - Cache statistics
/// - `GET /health` - Health check endpoint
///
/// Other methods on a tile path get 405; any other path gets a JSON 404.
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/styles/*tile", get(tile_handler))
        .route("/purge/*path", delete(purge_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .fallback(not_found_handler)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
