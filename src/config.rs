//! Configuration Module
//!
//! Handles loading and managing server configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::cache::{TtlPolicy, DEFAULT_MAX_CACHE_BYTES};
use crate::tile::{StyleCatalog, StyleCatalogError};
use crate::upstream::DEFAULT_MAX_BODY_BYTES;

// == Config Error ==
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {name}: '{value}'")]
    InvalidValue { name: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("invalid TILE_STYLES: {0}")]
    Styles(#[from] StyleCatalogError),
}

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible
/// defaults. Immutable for the process lifetime.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Base URL of the tile rendering backend
    pub upstream_url: String,
    /// Per-request upstream timeout in seconds
    pub upstream_timeout: u64,
    /// Largest upstream body buffered before the fetch fails
    pub max_body_bytes: u64,
    /// Longest a request waits on an in-flight fetch, in seconds
    pub lock_timeout: u64,
    /// Cache byte budget
    pub max_cache_bytes: u64,
    /// TTL of 200 responses in seconds
    pub ttl_ok: u64,
    /// TTL of 404 responses in seconds
    pub ttl_not_found: u64,
    /// TTL of any other response in seconds
    pub ttl_other: u64,
    /// How long expired entries may be served on upstream failure, in seconds
    pub stale_window: u64,
    /// Background sweep interval in seconds
    pub cleanup_interval: u64,
    /// Allowed styles and their max zoom
    pub styles: StyleCatalog,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `UPSTREAM_URL` - Tile backend base URL (default: http://127.0.0.1:8080)
    /// - `UPSTREAM_TIMEOUT` - Upstream timeout in seconds (default: 20)
    /// - `MAX_UPSTREAM_BODY_BYTES` - Upstream body cap (default: 64 MiB)
    /// - `LOCK_TIMEOUT` - In-flight wait timeout in seconds (default: 30)
    /// - `MAX_CACHE_BYTES` - Cache byte budget (default: 10 GiB)
    /// - `TTL_OK` / `TTL_NOT_FOUND` / `TTL_OTHER` - TTLs in seconds
    ///   (default: 604800 / 3600 / 60)
    /// - `STALE_WINDOW` - Stale serving window in seconds (default: 86400)
    /// - `CLEANUP_INTERVAL` - Sweep frequency in seconds (default: 60)
    /// - `TILE_STYLES` - Comma list of `name[:max_zoom]` (default: osm:20)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a Config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            server_port: parse_var(&lookup, "SERVER_PORT", defaults.server_port)?,
            upstream_url: lookup("UPSTREAM_URL")
                .filter(|url| !url.trim().is_empty())
                .unwrap_or(defaults.upstream_url),
            upstream_timeout: parse_var(&lookup, "UPSTREAM_TIMEOUT", defaults.upstream_timeout)?,
            max_body_bytes: parse_var(
                &lookup,
                "MAX_UPSTREAM_BODY_BYTES",
                defaults.max_body_bytes,
            )?,
            lock_timeout: parse_var(&lookup, "LOCK_TIMEOUT", defaults.lock_timeout)?,
            max_cache_bytes: parse_var(&lookup, "MAX_CACHE_BYTES", defaults.max_cache_bytes)?,
            ttl_ok: parse_var(&lookup, "TTL_OK", defaults.ttl_ok)?,
            ttl_not_found: parse_var(&lookup, "TTL_NOT_FOUND", defaults.ttl_not_found)?,
            ttl_other: parse_var(&lookup, "TTL_OTHER", defaults.ttl_other)?,
            stale_window: parse_var(&lookup, "STALE_WINDOW", defaults.stale_window)?,
            cleanup_interval: parse_var(&lookup, "CLEANUP_INTERVAL", defaults.cleanup_interval)?,
            styles: match lookup("TILE_STYLES") {
                Some(value) => value.parse()?,
                None => defaults.styles,
            },
        };

        for (name, value) in [
            ("MAX_CACHE_BYTES", config.max_cache_bytes),
            ("UPSTREAM_TIMEOUT", config.upstream_timeout),
            ("MAX_UPSTREAM_BODY_BYTES", config.max_body_bytes),
            ("LOCK_TIMEOUT", config.lock_timeout),
            ("CLEANUP_INTERVAL", config.cleanup_interval),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero(name));
            }
        }

        Ok(config)
    }

    pub fn ttl_policy(&self) -> TtlPolicy {
        TtlPolicy::new(
            Duration::from_secs(self.ttl_ok),
            Duration::from_secs(self.ttl_not_found),
            Duration::from_secs(self.ttl_other),
        )
    }
}

fn parse_var<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        None => Ok(default),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            upstream_url: "http://127.0.0.1:8080".to_string(),
            upstream_timeout: 20,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            lock_timeout: 30,
            max_cache_bytes: DEFAULT_MAX_CACHE_BYTES,
            ttl_ok: 7 * 24 * 60 * 60,
            ttl_not_found: 60 * 60,
            ttl_other: 60,
            stale_window: 24 * 60 * 60,
            cleanup_interval: 60,
            styles: StyleCatalog::new().with_style("osm", 20),
        }
    }
}
