//! Tile Module
//!
//! Tile request types, the style allow-list and the URL grammar router.

mod route;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

pub use route::{RouteRejection, TileRouter};

// == Public Constants ==
/// Max zoom applied to styles listed without an explicit `:max_zoom`.
pub const DEFAULT_MAX_ZOOM: u8 = 22;

/// Upper bound for any configured max zoom (keeps `2^z` inside `u32`).
pub const MAX_SUPPORTED_ZOOM: u8 = 30;

/// Edge length in pixels of a standard resolution tile.
pub const BASE_TILE_SIZE: u32 = 256;

// == Resolution ==
/// Pixel density variant requested through the `@2x` / `@3x` suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    Standard,
    Retina2x,
    Retina3x,
}

impl Resolution {
    /// Path suffix placed between the `y` coordinate and `.png`.
    pub fn suffix(&self) -> &'static str {
        match self {
            Resolution::Standard => "",
            Resolution::Retina2x => "@2x",
            Resolution::Retina3x => "@3x",
        }
    }

    pub fn scale(&self) -> u32 {
        match self {
            Resolution::Standard => 1,
            Resolution::Retina2x => 2,
            Resolution::Retina3x => 3,
        }
    }

    /// Edge length of the rendered tile: 256, 512 or 768 pixels.
    pub fn tile_size(&self) -> u32 {
        BASE_TILE_SIZE * self.scale()
    }
}

// == Tile Request ==
/// An accepted tile request, produced only by [`TileRouter::route`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileRequest {
    pub style: String,
    pub z: u8,
    pub x: u32,
    pub y: u32,
    pub resolution: Resolution,
    /// Normalized query string (pairs sorted, empty pairs dropped)
    pub query: Option<String>,
}

impl TileRequest {
    /// Canonical path, e.g. `/styles/osm/5/10/12@2x.png`.
    pub fn path(&self) -> String {
        format!(
            "/styles/{}/{}/{}/{}{}.png",
            self.style,
            self.z,
            self.x,
            self.y,
            self.resolution.suffix()
        )
    }

    /// Canonical path plus the normalized query, as forwarded upstream.
    pub fn uri(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{}", self.path(), query),
            None => self.path(),
        }
    }
}

impl fmt::Display for TileRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri())
    }
}

// == Style Catalog ==
/// Error produced when parsing a style allow-list such as `osm:20,basic`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StyleCatalogError {
    #[error("style list is empty")]
    Empty,

    #[error("invalid style name: '{0}'")]
    InvalidName(String),

    #[error("invalid max zoom for style '{style}': '{value}'")]
    InvalidMaxZoom { style: String, value: String },
}

/// Allow-list of styles the proxy will serve, each with its max zoom.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleCatalog {
    styles: HashMap<String, u8>,
}

impl StyleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a style. `max_zoom` is clamped to [`MAX_SUPPORTED_ZOOM`].
    pub fn with_style(mut self, name: impl Into<String>, max_zoom: u8) -> Self {
        self.styles.insert(name.into(), max_zoom.min(MAX_SUPPORTED_ZOOM));
        self
    }

    /// Returns the max zoom for an allowed style, or None if it is not listed.
    pub fn max_zoom(&self, style: &str) -> Option<u8> {
        self.styles.get(style).copied()
    }

    pub fn contains(&self, style: &str) -> bool {
        self.styles.contains_key(style)
    }

    /// Style names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.styles.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }
}

impl FromStr for StyleCatalog {
    type Err = StyleCatalogError;

    /// Parses a comma separated list of `name[:max_zoom]` items.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut catalog = StyleCatalog::new();

        for item in s.split(',').map(str::trim).filter(|item| !item.is_empty()) {
            let (name, zoom) = match item.split_once(':') {
                Some((name, zoom)) => (name.trim(), Some(zoom.trim())),
                None => (item, None),
            };

            if !is_valid_style_name(name) {
                return Err(StyleCatalogError::InvalidName(name.to_string()));
            }

            let max_zoom = match zoom {
                Some(value) => value
                    .parse::<u8>()
                    .ok()
                    .filter(|z| *z <= MAX_SUPPORTED_ZOOM)
                    .ok_or_else(|| StyleCatalogError::InvalidMaxZoom {
                        style: name.to_string(),
                        value: value.to_string(),
                    })?,
                None => DEFAULT_MAX_ZOOM,
            };

            catalog = catalog.with_style(name, max_zoom);
        }

        if catalog.is_empty() {
            return Err(StyleCatalogError::Empty);
        }
        Ok(catalog)
    }
}

/// Style names are restricted to URL-safe characters.
fn is_valid_style_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && name != "."
        && name != ".."
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn tile(resolution: Resolution, query: Option<&str>) -> TileRequest {
        TileRequest {
            style: "osm".to_string(),
            z: 5,
            x: 10,
            y: 12,
            resolution,
            query: query.map(str::to_string),
        }
    }

    #[test]
    fn test_resolution_tile_sizes() {
        assert_eq!(Resolution::Standard.tile_size(), 256);
        assert_eq!(Resolution::Retina2x.tile_size(), 512);
        assert_eq!(Resolution::Retina3x.tile_size(), 768);
    }

    #[test]
    fn test_tile_path() {
        assert_eq!(
            tile(Resolution::Standard, None).path(),
            "/styles/osm/5/10/12.png"
        );
        assert_eq!(
            tile(Resolution::Retina2x, None).path(),
            "/styles/osm/5/10/12@2x.png"
        );
    }

    #[test]
    fn test_tile_uri_with_query() {
        let request = tile(Resolution::Retina3x, Some("lang=en"));
        assert_eq!(request.uri(), "/styles/osm/5/10/12@3x.png?lang=en");
        assert_eq!(request.to_string(), request.uri());
    }

    #[test]
    fn test_catalog_parse() {
        let catalog: StyleCatalog = "osm:20, basic , dark:14".parse().unwrap();

        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.max_zoom("osm"), Some(20));
        assert_eq!(catalog.max_zoom("basic"), Some(DEFAULT_MAX_ZOOM));
        assert_eq!(catalog.max_zoom("dark"), Some(14));
        assert_eq!(catalog.names(), vec!["basic", "dark", "osm"]);
    }

    #[test]
    fn test_catalog_parse_errors() {
        assert_eq!("".parse::<StyleCatalog>(), Err(StyleCatalogError::Empty));
        assert_eq!(" , ".parse::<StyleCatalog>(), Err(StyleCatalogError::Empty));
        assert!(matches!(
            "os/m".parse::<StyleCatalog>(),
            Err(StyleCatalogError::InvalidName(_))
        ));
        assert!(matches!(
            "osm:abc".parse::<StyleCatalog>(),
            Err(StyleCatalogError::InvalidMaxZoom { .. })
        ));
        assert!(matches!(
            "osm:31".parse::<StyleCatalog>(),
            Err(StyleCatalogError::InvalidMaxZoom { .. })
        ));
    }

    #[test]
    fn test_catalog_with_style_clamps_zoom() {
        let catalog = StyleCatalog::new().with_style("osm", 99);
        assert_eq!(catalog.max_zoom("osm"), Some(MAX_SUPPORTED_ZOOM));
        assert!(catalog.contains("osm"));
        assert!(!catalog.contains("other"));
    }
}
