//! Validated tile sub-paths.
//!
//! The inbound path is appended to the upstream base URL, so it is restricted
//! to an allow-list of characters and a simple segment grammar:
//!
//! ```text
//! path    = segment *( "/" segment )
//! segment = 1*( ALPHA / DIGIT / "." / "_" / "-" ), not "." or ".."
//! ```
//!
//! A typical basemap path is `global_monthly_2024_08_mosaic/gmap/10/330/553.png`.

use std::fmt;

use crate::error::TilePathError;

/// Maximum accepted tile path length in bytes.
pub const MAX_TILE_PATH_LEN: usize = 512;

/// Returns true for characters allowed in a tile path.
#[inline]
pub fn is_safe_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '/' | '.' | '_' | '-')
}

/// A tile path that is safe to splice into an upstream URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TilePath(String);

impl TilePath {
    /// Validate a caller-supplied tile path.
    pub fn parse(raw: &str) -> Result<Self, TilePathError> {
        if raw.is_empty() {
            return Err(TilePathError::Empty);
        }

        if raw.len() > MAX_TILE_PATH_LEN {
            return Err(TilePathError::TooLong {
                len: raw.len(),
                max: MAX_TILE_PATH_LEN,
            });
        }

        if let Some((position, ch)) = raw.char_indices().find(|(_, c)| !is_safe_char(*c)) {
            return Err(TilePathError::DisallowedCharacter { ch, position });
        }

        if raw.starts_with('/') || raw.ends_with('/') {
            return Err(TilePathError::BoundarySeparator);
        }

        if let Some(segment) = raw
            .split('/')
            .find(|s| s.is_empty() || *s == "." || *s == "..")
        {
            return Err(TilePathError::InvalidSegment {
                segment: segment.to_string(),
            });
        }

        Ok(Self(raw.to_string()))
    }

    /// The validated path.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path segments, in order.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }
}

impl fmt::Display for TilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
