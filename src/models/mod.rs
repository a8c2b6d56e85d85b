//! Response models for the tile cache admin API
//!
//! JSON bodies for the stats, health, purge and error responses.

pub mod responses;

pub use responses::{ErrorResponse, HealthResponse, PurgeResponse, StatsResponse};
