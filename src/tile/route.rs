//! Tile Router
//!
//! Matches request paths against the tile URL grammar:
//! `/styles/{style}/{z}/{x}/{y}(@2x|@3x)?.png`

use std::sync::Arc;

use thiserror::Error;

use super::{Resolution, StyleCatalog, TileRequest};

const STYLES_PREFIX: &str = "/styles/";
const TILE_EXTENSION: &str = ".png";

/// Longest accepted coordinate literal; anything longer cannot fit a `u32`.
const MAX_COORD_DIGITS: usize = 10;

// == Route Rejection ==
/// Why a path was rejected. Every rejection surfaces as a plain 404.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteRejection {
    #[error("path does not match the tile grammar")]
    Malformed,

    #[error("style '{0}' is not served")]
    UnknownStyle(String),

    #[error("zoom {z} exceeds max zoom {max_zoom}")]
    ZoomOutOfRange { z: u32, max_zoom: u8 },

    #[error("tile {x}/{y} is outside the grid at zoom {z}")]
    TileOutOfRange { z: u8, x: u32, y: u32 },
}

// == Tile Router ==
/// Accepts or rejects request paths. Cheap to clone.
#[derive(Debug, Clone)]
pub struct TileRouter {
    catalog: Arc<StyleCatalog>,
}

impl TileRouter {
    pub fn new(catalog: StyleCatalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
        }
    }

    pub fn catalog(&self) -> &StyleCatalog {
        &self.catalog
    }

    // == Route ==
    /// Parses `path` (and the optional raw query) into a [`TileRequest`].
    pub fn route(&self, path: &str, query: Option<&str>) -> Result<TileRequest, RouteRejection> {
        let rest = path
            .strip_prefix(STYLES_PREFIX)
            .ok_or(RouteRejection::Malformed)?;

        let mut segments = rest.split('/');
        let (style, z, x, last) = match (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) {
            (Some(style), Some(z), Some(x), Some(last), None) => (style, z, x, last),
            _ => return Err(RouteRejection::Malformed),
        };

        let file = last
            .strip_suffix(TILE_EXTENSION)
            .ok_or(RouteRejection::Malformed)?;
        let (y, resolution) = match file.split_once('@') {
            Some((y, "2x")) => (y, Resolution::Retina2x),
            Some((y, "3x")) => (y, Resolution::Retina3x),
            Some(_) => return Err(RouteRejection::Malformed),
            None => (file, Resolution::Standard),
        };

        let z = parse_coord(z)?;
        let x = parse_coord(x)?;
        let y = parse_coord(y)?;

        if style.is_empty() {
            return Err(RouteRejection::Malformed);
        }
        let max_zoom = self
            .catalog
            .max_zoom(style)
            .ok_or_else(|| RouteRejection::UnknownStyle(style.to_string()))?;

        if z > u32::from(max_zoom) {
            return Err(RouteRejection::ZoomOutOfRange { z, max_zoom });
        }
        // z <= max_zoom <= 30 from here on
        let z = z as u8;
        let grid = 1u64 << z;
        if u64::from(x) >= grid || u64::from(y) >= grid {
            return Err(RouteRejection::TileOutOfRange { z, x, y });
        }

        Ok(TileRequest {
            style: style.to_string(),
            z,
            x,
            y,
            resolution,
            query: normalize_query(query),
        })
    }
}

/// Non-negative decimal integer made of ASCII digits only.
fn parse_coord(segment: &str) -> Result<u32, RouteRejection> {
    if segment.is_empty()
        || segment.len() > MAX_COORD_DIGITS
        || !segment.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(RouteRejection::Malformed);
    }
    segment.parse().map_err(|_| RouteRejection::Malformed)
}

/// Drops empty pairs and sorts the rest so equivalent queries share a key.
pub(crate) fn normalize_query(query: Option<&str>) -> Option<String> {
    let mut pairs: Vec<&str> = query?.split('&').filter(|p| !p.is_empty()).collect();
    if pairs.is_empty() {
        return None;
    }
    pairs.sort_unstable();
    Some(pairs.join("&"))
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> TileRouter {
        TileRouter::new(StyleCatalog::new().with_style("osm", 14))
    }

    #[test]
    fn test_route_standard_tile() {
        let tile = router().route("/styles/osm/5/10/12.png", None).unwrap();

        assert_eq!(tile.style, "osm");
        assert_eq!((tile.z, tile.x, tile.y), (5, 10, 12));
        assert_eq!(tile.resolution, Resolution::Standard);
        assert!(tile.query.is_none());
    }

    #[test]
    fn test_route_retina_variants() {
        let tile = router().route("/styles/osm/5/10/12@2x.png", None).unwrap();
        assert_eq!(tile.resolution, Resolution::Retina2x);
        assert_eq!(tile.resolution.tile_size(), 512);

        let tile = router().route("/styles/osm/5/10/12@3x.png", None).unwrap();
        assert_eq!(tile.resolution, Resolution::Retina3x);
    }

    #[test]
    fn test_route_rejects_non_tile_paths() {
        let router = router();
        for path in [
            "/admin",
            "/",
            "/styles/",
            "/styles/osm",
            "/styles/osm/5/10",
            "/styles/osm/5/10/12",
            "/styles/osm/5/10/12.jpg",
            "/styles/osm/5/10/12@4x.png",
            "/styles/osm/5/10/12@2x@2x.png",
            "/styles/osm/5/10/12.png/extra",
            "/styles//5/10/12.png",
            "/styles/osm/-1/0/0.png",
            "/styles/osm/+5/0/0.png",
            "/styles/osm/5/ten/12.png",
            "/styles/osm/5/10/.png",
            "/styles/osm/5/99999999999/1.png",
            "styles/osm/5/10/12.png",
        ] {
            assert_eq!(
                router.route(path, None),
                Err(RouteRejection::Malformed),
                "path {path} should be malformed"
            );
        }
    }

    #[test]
    fn test_route_rejects_unknown_style() {
        assert_eq!(
            router().route("/styles/satellite/5/10/12.png", None),
            Err(RouteRejection::UnknownStyle("satellite".to_string()))
        );
    }

    #[test]
    fn test_route_rejects_zoom_above_max() {
        assert_eq!(
            router().route("/styles/osm/15/0/0.png", None),
            Err(RouteRejection::ZoomOutOfRange {
                z: 15,
                max_zoom: 14
            })
        );
        assert!(router().route("/styles/osm/14/0/0.png", None).is_ok());
    }

    #[test]
    fn test_route_rejects_tile_outside_grid() {
        // zoom 2 is a 4x4 grid
        assert!(router().route("/styles/osm/2/3/3.png", None).is_ok());
        assert_eq!(
            router().route("/styles/osm/2/4/0.png", None),
            Err(RouteRejection::TileOutOfRange { z: 2, x: 4, y: 0 })
        );
        assert_eq!(
            router().route("/styles/osm/0/0/1.png", None),
            Err(RouteRejection::TileOutOfRange { z: 0, x: 0, y: 1 })
        );
    }

    #[test]
    fn test_route_leading_zeros_share_canonical_path() {
        let padded = router().route("/styles/osm/05/010/012.png", None).unwrap();
        let plain = router().route("/styles/osm/5/10/12.png", None).unwrap();
        assert_eq!(padded, plain);
    }

    #[test]
    fn test_route_normalizes_query() {
        let tile = router()
            .route("/styles/osm/1/0/0.png", Some("b=2&&a=1&"))
            .unwrap();
        assert_eq!(tile.query.as_deref(), Some("a=1&b=2"));

        let tile = router().route("/styles/osm/1/0/0.png", Some("&")).unwrap();
        assert!(tile.query.is_none());
    }
}
