//! HTTP tile backend using reqwest.

use std::time::Duration;

use axum::body::Bytes;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use tracing::{debug, trace, warn};

use super::{BackendFuture, TileBackend, UpstreamError, UpstreamResponse};
use crate::cache::ResponseHeaders;
use crate::tile::TileRequest;

const USER_AGENT: &str = concat!("tile_cache/", env!("CARGO_PKG_VERSION"));

/// Response headers kept from the backend; everything else is dropped.
pub const FORWARDED_HEADERS: &[&str] = &[
    "content-type",
    "content-encoding",
    "etag",
    "last-modified",
    "cache-control",
    "expires",
];

/// Largest upstream body read before the fetch is abandoned.
pub const DEFAULT_MAX_BODY_BYTES: u64 = 64 * 1024 * 1024;

/// Forwards tile requests to `GET {base_url}{tile uri}`.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    max_body_bytes: u64,
}

impl HttpBackend {
    /// Creates a backend with a pooled client and a per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .pool_max_idle_per_host(64)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| UpstreamError::Transport(format!("failed to build client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        })
    }

    /// Caps how much of a response body is buffered.
    pub fn with_max_body_bytes(mut self, max_body_bytes: u64) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url_for(&self, tile: &TileRequest) -> String {
        format!("{}{}", self.base_url, tile.uri())
    }

    async fn fetch_tile(&self, tile: &TileRequest) -> Result<UpstreamResponse, UpstreamError> {
        let url = self.url_for(tile);
        trace!(url = %url, "Upstream request starting");

        let mut response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.classify(&url, e))?;

        let status = StatusCode::from_u16(response.status().as_u16())
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        let mut headers = ResponseHeaders::new();
        for &name in FORWARDED_HEADERS {
            let Some(value) = response.headers().get(name) else {
                continue;
            };
            if let Ok(value) = HeaderValue::from_bytes(value.as_bytes()) {
                headers.insert(HeaderName::from_static(name), value);
            }
        }

        let body = self.read_body(&url, &mut response).await?;
        debug!(
            url = %url,
            status = status.as_u16(),
            bytes = body.len(),
            "Upstream response received"
        );

        let upstream = UpstreamResponse {
            status,
            headers,
            body,
        };
        if status.is_server_error() {
            warn!(url = %url, status = status.as_u16(), "Upstream error status");
            return Err(UpstreamError::BackendError(upstream));
        }
        Ok(upstream)
    }

    /// Buffers the body, giving up as soon as it would exceed the limit.
    async fn read_body(
        &self,
        url: &str,
        response: &mut reqwest::Response,
    ) -> Result<Bytes, UpstreamError> {
        let limit = self.max_body_bytes;
        let too_large = || {
            warn!(url = url, limit, "Upstream body exceeds limit");
            UpstreamError::BodyTooLarge(limit)
        };

        let declared = response.content_length();
        if declared.is_some_and(|len| len > limit) {
            return Err(too_large());
        }

        let mut body = Vec::with_capacity(declared.unwrap_or(0) as usize);
        while let Some(chunk) = response.chunk().await.map_err(|e| self.classify(url, e))? {
            if (body.len() + chunk.len()) as u64 > limit {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }
        Ok(Bytes::from(body))
    }

    fn classify(&self, url: &str, err: reqwest::Error) -> UpstreamError {
        warn!(
            url = url,
            error = %err,
            is_connect = err.is_connect(),
            is_timeout = err.is_timeout(),
            "Upstream request failed"
        );
        if err.is_timeout() {
            UpstreamError::Timeout(self.timeout)
        } else if err.is_connect() {
            UpstreamError::ConnectionRefused(err.to_string())
        } else {
            UpstreamError::Transport(err.to_string())
        }
    }
}

impl TileBackend for HttpBackend {
    fn fetch<'a>(&'a self, tile: &'a TileRequest) -> BackendFuture<'a> {
        Box::pin(self.fetch_tile(tile))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::Resolution;
    use axum::{
        extract::RawQuery,
        http::header,
        response::IntoResponse,
        routing::get,
        Router,
    };

    fn tile(query: Option<&str>) -> TileRequest {
        TileRequest {
            style: "osm".to_string(),
            z: 3,
            x: 1,
            y: 2,
            resolution: Resolution::Retina2x,
            query: query.map(str::to_string),
        }
    }

    async fn spawn_backend(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_url_for_trims_trailing_slash() {
        let backend = HttpBackend::new("http://tiles.local/", Duration::from_secs(1)).unwrap();
        assert_eq!(backend.base_url(), "http://tiles.local");
        assert_eq!(
            backend.url_for(&tile(Some("a=1"))),
            "http://tiles.local/styles/osm/3/1/2@2x.png?a=1"
        );
    }

    #[tokio::test]
    async fn test_fetch_success_keeps_forwarded_headers() {
        let app = Router::new().route(
            "/styles/osm/3/1/2@2x.png",
            get(|RawQuery(query): RawQuery| async move {
                assert_eq!(query.as_deref(), Some("a=1"));
                (
                    [
                        (header::CONTENT_TYPE, "image/png"),
                        (header::ETAG, "\"abc\""),
                        (header::SET_COOKIE, "session=1"),
                    ],
                    "tile-bytes",
                )
                    .into_response()
            }),
        );
        let base = spawn_backend(app).await;
        let backend = HttpBackend::new(base, Duration::from_secs(5)).unwrap();

        let response = backend.fetch(&tile(Some("a=1"))).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(&response.body[..], b"tile-bytes");
        assert_eq!(response.headers.get("content-type").unwrap(), "image/png");
        assert_eq!(response.headers.get("etag").unwrap(), "\"abc\"");
        assert!(response.headers.get("set-cookie").is_none());
    }

    #[tokio::test]
    async fn test_fetch_not_found_is_ok() {
        let base = spawn_backend(Router::new()).await;
        let backend = HttpBackend::new(base, Duration::from_secs(5)).unwrap();

        let response = backend.fetch(&tile(None)).await.unwrap();
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_fetch_server_error_is_backend_error() {
        let app = Router::new().route(
            "/styles/osm/3/1/2@2x.png",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down") }),
        );
        let base = spawn_backend(app).await;
        let backend = HttpBackend::new(base, Duration::from_secs(5)).unwrap();

        match backend.fetch(&tile(None)).await {
            Err(UpstreamError::BackendError(response)) => {
                assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(&response.body[..], b"down");
            }
            other => panic!("expected backend error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let app = Router::new().route(
            "/styles/osm/3/1/2@2x.png",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                "late"
            }),
        );
        let base = spawn_backend(app).await;
        let backend = HttpBackend::new(base, Duration::from_millis(100)).unwrap();

        let result = backend.fetch(&tile(None)).await;
        assert!(matches!(result, Err(UpstreamError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_fetch_rejects_body_over_limit() {
        let app = Router::new().route(
            "/styles/osm/3/1/2@2x.png",
            get(|| async { vec![7u8; 100] }),
        );
        let base = spawn_backend(app).await;
        let backend = HttpBackend::new(base, Duration::from_secs(5))
            .unwrap()
            .with_max_body_bytes(64);

        let result = backend.fetch(&tile(None)).await;
        assert!(matches!(result, Err(UpstreamError::BodyTooLarge(64))));
    }

    #[tokio::test]
    async fn test_fetch_accepts_body_at_limit() {
        let app = Router::new().route(
            "/styles/osm/3/1/2@2x.png",
            get(|| async { vec![7u8; 64] }),
        );
        let base = spawn_backend(app).await;
        let backend = HttpBackend::new(base, Duration::from_secs(5))
            .unwrap()
            .with_max_body_bytes(64);

        let response = backend.fetch(&tile(None)).await.unwrap();
        assert_eq!(response.body.len(), 64);
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        // Bind then drop to obtain a port nobody listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let backend =
            HttpBackend::new(format!("http://{}", addr), Duration::from_secs(5)).unwrap();

        let result = backend.fetch(&tile(None)).await;
        assert!(matches!(result, Err(UpstreamError::ConnectionRefused(_))));
    }
}
