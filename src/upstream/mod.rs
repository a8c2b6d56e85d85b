//! Upstream Module
//!
//! Client side of the tile rendering backend. Cache misses are forwarded
//! through a [`TileBackend`]; [`HttpBackend`] is the production
//! implementation.

mod http;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::StatusCode;
use thiserror::Error;

use crate::cache::ResponseHeaders;
use crate::tile::TileRequest;

pub use http::{HttpBackend, DEFAULT_MAX_BODY_BYTES, FORWARDED_HEADERS};

// == Upstream Response ==
/// A backend response, owned for the duration of one fetch.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: ResponseHeaders,
    pub body: Bytes,
}

impl UpstreamResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: ResponseHeaders::new(),
            body: body.into(),
        }
    }

    pub fn with_headers(mut self, headers: ResponseHeaders) -> Self {
        self.headers = headers;
        self
    }
}

// == Upstream Error ==
/// Ways a fetch can fail. Cloneable so one failure can be shared with
/// every coalesced waiter.
#[derive(Error, Debug, Clone)]
pub enum UpstreamError {
    #[error("upstream timed out after {0:?}")]
    Timeout(Duration),

    #[error("upstream connection refused: {0}")]
    ConnectionRefused(String),

    /// The backend answered with a 5xx status
    #[error("upstream returned status {}", .0.status)]
    BackendError(UpstreamResponse),

    #[error("upstream transport error: {0}")]
    Transport(String),

    #[error("upstream body larger than {0} bytes")]
    BodyTooLarge(u64),
}

/// Boxed future returned by [`TileBackend::fetch`].
pub type BackendFuture<'a> =
    Pin<Box<dyn Future<Output = Result<UpstreamResponse, UpstreamError>> + Send + 'a>>;

// == Tile Backend ==
/// Source of rendered tiles.
///
/// Implementations return `Ok` for any status below 500 and
/// [`UpstreamError::BackendError`] for 5xx responses.
pub trait TileBackend: Send + Sync + 'static {
    fn fetch<'a>(&'a self, tile: &'a TileRequest) -> BackendFuture<'a>;
}
