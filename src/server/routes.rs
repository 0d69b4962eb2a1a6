//! Router configuration for the tile relay.
//!
//! # Route Structure
//!
//! ```text
//! /tiles/{*tile_path}    - Tile relay (no inbound authentication)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use tile_relay::server::routes::{create_router, RouterConfig};
//! use tile_relay::tile::{RelayService, RelaySettings};
//! use tile_relay::upstream::HttpUpstream;
//!
//! let upstream = HttpUpstream::new(Duration::from_secs(30), Duration::from_secs(10), None)?;
//! let relay = RelayService::new(upstream, settings);
//!
//! let config = RouterConfig::new()
//!     .with_cors_origins(vec!["http://localhost:8501".to_string()]);
//!
//! let router = create_router(relay, config);
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:5000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::time::Duration;

use axum::{routing::get, Router};
use http::header::CONTENT_TYPE;
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{tile_handler, AppState};
use crate::tile::RelayService;
use crate::upstream::TileUpstream;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl RouterConfig {
    /// Create a router configuration with defaults.
    ///
    /// By default:
    /// - CORS allows any origin
    /// - Tracing is enabled
    pub fn new() -> Self {
        Self {
            cors_origins: None,
            enable_tracing: true,
        }
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the application router.
///
/// The router has a single route, `/tiles/{*tile_path}`, plus:
/// - CORS configuration
/// - Request tracing (optional)
///
/// Anything else answers 404.
pub fn create_router<U: TileUpstream>(relay: RelayService<U>, config: RouterConfig) -> Router {
    let app_state = AppState::new(relay);
    let cors = build_cors_layer(&config);

    let router = Router::new()
        .route("/tiles/{*tile_path}", get(tile_handler::<U>))
        .with_state(app_state)
        .layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(86400)); // 24 hours

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
