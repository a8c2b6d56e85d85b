//! Cache Key Module
//!
//! Normalized request identity used to address cache entries.

use std::fmt;
use std::sync::Arc;

use axum::http::Method;

use crate::tile::TileRequest;

// == Cache Key ==
/// Method plus canonical tile URI, e.g. `GET /styles/osm/5/10/12@2x.png`.
///
/// Immutable once built; cloning shares the underlying string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(Arc<str>);

impl CacheKey {
    /// Builds the key for a routed tile request.
    pub fn for_tile(method: &Method, tile: &TileRequest) -> Self {
        Self(Arc::from(format!("{} {}", method, tile.uri())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key length in bytes, counted towards the entry size.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(value: &str) -> Self {
        Self(Arc::from(value))
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::{StyleCatalog, TileRouter};

    fn route(path: &str, query: Option<&str>) -> TileRequest {
        TileRouter::new(StyleCatalog::new().with_style("osm", 20))
            .route(path, query)
            .unwrap()
    }

    #[test]
    fn test_key_format() {
        let key = CacheKey::for_tile(&Method::GET, &route("/styles/osm/5/10/12@2x.png", None));
        assert_eq!(key.as_str(), "GET /styles/osm/5/10/12@2x.png");
        assert_eq!(key.len(), key.to_string().len());
    }

    #[test]
    fn test_equivalent_requests_share_key() {
        let padded = route("/styles/osm/05/10/12.png", Some("b=1&a=2"));
        let canonical = route("/styles/osm/5/10/12.png", Some("a=2&b=1"));
        let a = CacheKey::for_tile(&Method::GET, &padded);
        let b = CacheKey::for_tile(&Method::GET, &canonical);
        assert_eq!(a, b);
    }

    #[test]
    fn test_resolution_and_method_distinguish_keys() {
        let standard = CacheKey::for_tile(&Method::GET, &route("/styles/osm/5/10/12.png", None));
        let retina = CacheKey::for_tile(&Method::GET, &route("/styles/osm/5/10/12@2x.png", None));
        let head = CacheKey::for_tile(&Method::HEAD, &route("/styles/osm/5/10/12.png", None));

        assert_ne!(standard, retina);
        assert_ne!(standard, head);
    }
}
