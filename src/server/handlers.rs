//! HTTP request handlers for the tile relay.
//!
//! # Endpoints
//!
//! - `GET /tiles/{*tile_path}` - Relay a tile from the upstream provider
//!
//! The relay performs no inbound access control. It is meant to be bound to
//! a loopback address and used by a local map client.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::error::{RelayError, UpstreamError};
use crate::tile::RelayService;
use crate::upstream::TileUpstream;

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the relay service.
///
/// This is passed to all handlers via Axum's State extractor. Everything in it
/// is read-only after startup.
pub struct AppState<U: TileUpstream> {
    /// The relay service for forwarding tile requests
    pub relay: RelayService<U>,
}

impl<U: TileUpstream> AppState<U> {
    /// Create a new application state with the given relay.
    pub fn new(relay: RelayService<U>) -> Self {
        Self { relay }
    }
}

impl<U: TileUpstream> Clone for AppState<U> {
    fn clone(&self) -> Self {
        Self {
            relay: self.relay.clone(),
        }
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "invalid_tile_path", "upstream_status")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    pub status: u16,
}

impl ErrorResponse {
    /// Create an error response for the given status.
    pub fn new(error: impl Into<String>, message: impl Into<String>, status: StatusCode) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: status.as_u16(),
        }
    }
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Convert RelayError to HTTP response.
///
/// Upstream statuses are propagated as-is. Transport failures become 502 or
/// 504. Logging follows severity:
/// - 404s at DEBUG (map clients probe outside mosaic coverage all the time)
/// - other 4xx at WARN
/// - 5xx at ERROR
impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            // 400 Bad Request - rejected before any outbound call
            RelayError::InvalidPath(err) => (
                StatusCode::BAD_REQUEST,
                "invalid_tile_path",
                format!("Invalid tile path: {}", err),
            ),

            RelayError::Upstream(UpstreamError::Status(code)) => (
                StatusCode::from_u16(*code).unwrap_or(StatusCode::BAD_GATEWAY),
                "upstream_status",
                format!("Upstream returned status {}", code),
            ),

            RelayError::Upstream(UpstreamError::Timeout(msg)) => (
                StatusCode::GATEWAY_TIMEOUT,
                "upstream_timeout",
                format!("Upstream timed out: {}", msg),
            ),

            RelayError::Upstream(UpstreamError::Connection(msg)) => (
                StatusCode::BAD_GATEWAY,
                "upstream_unreachable",
                format!("Upstream unreachable: {}", msg),
            ),

            RelayError::Upstream(UpstreamError::EmptyBody) => (
                StatusCode::BAD_GATEWAY,
                "empty_upstream_body",
                "Upstream returned success with an empty body".to_string(),
            ),

            RelayError::Upstream(UpstreamError::BodyTooLarge { limit }) => (
                StatusCode::BAD_GATEWAY,
                "upstream_body_too_large",
                format!("Upstream body exceeds {} bytes", limit),
            ),
        };

        if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Server error: {}",
                message
            );
        } else if status == StatusCode::NOT_FOUND {
            debug!(
                error_type = error_type,
                status = status.as_u16(),
                "Resource not found: {}",
                message
            );
        } else {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                "Client error: {}",
                message
            );
        }

        let error_response = ErrorResponse::new(error_type, message, status);

        (status, Json(error_response)).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle tile requests.
///
/// # Endpoint
///
/// `GET /tiles/{*tile_path}`
///
/// # Path Parameters
///
/// - `tile_path`: Everything after `/tiles/`, e.g.
///   `global_monthly_2024_08_mosaic/gmap/10/330/553.png`. Only ASCII letters,
///   digits, `/`, `.`, `_` and `-` are accepted.
///
/// The inbound query string is ignored and never forwarded.
///
/// # Response
///
/// - `2xx`: Upstream body verbatim with the upstream `Content-Type`
/// - `400 Bad Request`: Tile path rejected, no upstream call made
/// - `4xx`/`5xx`: Upstream status propagated, JSON error body
/// - `502 Bad Gateway`: Upstream unreachable or returned an empty body
/// - `504 Gateway Timeout`: Upstream timed out
///
/// If the client disconnects first, the handler future is dropped and the
/// outbound request with it.
pub async fn tile_handler<U: TileUpstream>(
    State(state): State<AppState<U>>,
    Path(tile_path): Path<String>,
) -> Result<Response, RelayError> {
    let tile = state.relay.fetch_tile(&tile_path).await?;

    let response = (
        tile.status,
        [(header::CONTENT_TYPE, tile.content_type)],
        Body::from(tile.data),
    )
        .into_response();

    Ok(response)
}

// =============================================================================
// Tests
// =============================================================================
