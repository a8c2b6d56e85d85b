//! Error types for the tile cache server
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;
use crate::upstream::UpstreamError;

// == Proxy Error Enum ==
/// Request-level failures surfaced at the HTTP boundary.
///
/// Each request fails independently; none of these is fatal to the process.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Path does not match the tile grammar, or the key is not cached
    #[error("Not found: {0}")]
    NotFound(String),

    /// Upstream did not answer in time and no stale entry was available
    #[error("Upstream timeout: {0}")]
    UpstreamTimeout(String),

    /// Upstream unreachable and no stale entry was available
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::NotFound(_) => StatusCode::NOT_FOUND,
            ProxyError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// == Conversions ==
impl From<UpstreamError> for ProxyError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::Timeout(_) => ProxyError::UpstreamTimeout(err.to_string()),
            UpstreamError::ConnectionRefused(_)
            | UpstreamError::BackendError(_)
            | UpstreamError::Transport(_)
            | UpstreamError::BodyTooLarge(_) => ProxyError::UpstreamUnavailable(err.to_string()),
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the tile cache server.
pub type Result<T> = std::result::Result<T, ProxyError>;
