//! Tile Cache - a caching reverse proxy for map tile servers
//!
//! Serves rendered tiles from an in-memory cache with status-dependent
//! TTLs, byte-budgeted LRU eviction and coalesced upstream fetches.

pub mod api;
pub mod cache;
pub mod config;
pub mod deploy;
pub mod error;
pub mod models;
pub mod proxy;
pub mod tasks;
pub mod tile;
pub mod upstream;

pub use api::{create_router, AppState};
pub use config::Config;
pub use proxy::{CacheStatus, TileProxy};
pub use tasks::spawn_cleanup_task;
