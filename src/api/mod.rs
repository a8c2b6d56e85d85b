//! API Module
//!
//! HTTP handlers and routing for the tile cache server.
//!
//! # Endpoints
//! - `GET /styles/{style}/{z}/{x}/{y}(@2x|@3x)?.png` - Cached tile
//! - `DELETE /purge/styles/...` - Drop one cached tile
//! - `GET /stats` - Get cache statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
