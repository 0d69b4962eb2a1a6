//! # Tile Relay
//!
//! A local relay for satellite basemap tiles.
//!
//! Browser map clients need tile URLs, and basemap providers want an API key
//! on every tile request. Putting the key in the page hands it to anyone who
//! opens the developer tools. This crate serves `/tiles/{*tile_path}` locally
//! and adds the key on the outbound leg only.
//!
//! ## Features
//!
//! - **Credential isolation**: The key lives in an immutable, redacted [`ApiKey`]
//!   and never appears in responses, error bodies or logs
//! - **Path allow-list**: Tile paths are restricted to a URL-safe subset before
//!   they reach the upstream URL
//! - **Status propagation**: Upstream 4xx/5xx are passed through; transport
//!   failures become 502/504, never an empty 200
//! - **Bounded retry**: Transient failures are retried once, client errors never
//!
//! ## Architecture
//!
//! - [`tile`] - Tile path validation and the relay service
//! - [`upstream`] - Outbound transport trait and the reqwest implementation
//! - [`server`] - Axum-based HTTP server and routes
//! - [`credential`] - API key type and secrets file loading
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use tile_relay::{build_relay, create_router, RouterConfig, UpstreamArgs};
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() {
//!     let args = UpstreamArgs {
//!         upstream_url: "https://tiles.planet.com/basemaps/v1/planet-tiles".to_string(),
//!         api_key: None,
//!         secrets_file: PathBuf::from(".streamlit/secrets.toml"),
//!         timeout: 30,
//!         connect_timeout: 10,
//!         no_retry: false,
//!         max_tile_bytes: tile_relay::upstream::DEFAULT_MAX_TILE_BYTES,
//!         upstream_proxy: None,
//!     };
//!
//!     // Fails before anything is bound if the key is missing
//!     let (relay, _source) = build_relay(&args).expect("configuration");
//!     let router = create_router(relay, RouterConfig::new());
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:5000").await.unwrap();
//!     axum::serve(listener, router).await.unwrap();
//! }
//! ```

pub mod config;
pub mod credential;
pub mod error;
pub mod server;
pub mod tile;
pub mod upstream;

// Re-export commonly used types
pub use config::{CheckConfig, Cli, Command, ServeConfig, UpstreamArgs};
pub use credential::{ApiKey, KeySource};
pub use error::{ConfigError, RelayError, TilePathError, UpstreamError};
pub use server::{create_router, tile_handler, AppState, ErrorResponse, RouterConfig};
pub use tile::{RelayService, RelaySettings, TilePath, TileRequest, TileResponse};
pub use upstream::{HttpUpstream, TileUpstream, UpstreamResponse};

/// Build the production relay from upstream arguments.
///
/// Validates settings and loads the credential before creating the HTTP
/// client. Callers must do this before binding a listener so that a missing
/// or malformed key stops startup.
pub fn build_relay(
    args: &UpstreamArgs,
) -> Result<(RelayService<HttpUpstream>, KeySource), ConfigError> {
    let (settings, source) = args.relay_settings()?;
    let upstream = HttpUpstream::new(
        args.timeout(),
        args.connect_timeout(),
        args.upstream_proxy.as_deref(),
    )?
    .with_max_body_bytes(args.max_tile_bytes);
    Ok((RelayService::new(upstream, settings), source))
}
