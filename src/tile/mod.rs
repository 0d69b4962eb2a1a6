//! Tile relay layer.
//!
//! This module turns a caller-supplied tile path into an authorized upstream
//! request and validates what comes back.
//!
//! # Architecture
//!
//! The relay service sits between the HTTP layer and the upstream transport:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              HTTP Handlers              │
//! └────────────────────┬────────────────────┘
//!                      │  raw tile path
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              RelayService               │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │   TilePath   │  │  RelaySettings  │  │
//! │  │ (allow-list) │  │ (base URL, key) │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              TileUpstream               │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`RelayService`]: Main entry point, validates, forwards and retries
//! - [`TilePath`]: Tile sub-path restricted to a URL-safe subset
//! - [`TileRequest`]: A validated request, free of credentials
//! - [`TileResponse`]: Upstream bytes and content type, ready to return
//!
//! # Example
//!
//! ```
//! use tile_relay::tile::TilePath;
//!
//! let path = TilePath::parse("global_monthly_2024_10_mosaic/gmap/10/330/553.png").unwrap();
//! assert_eq!(path.segments().count(), 5);
//!
//! assert!(TilePath::parse("mosaic/1/2/3.png?api_key=stolen").is_err());
//! assert!(TilePath::parse("../admin").is_err());
//! ```

mod path;
mod service;

pub use path::{is_safe_char, TilePath, MAX_TILE_PATH_LEN};
pub use service::{
    RelayService, RelaySettings, TileRequest, TileResponse, API_KEY_PARAM, DEFAULT_UPSTREAM_URL,
    FALLBACK_CONTENT_TYPE, RETRY_DELAY,
};
