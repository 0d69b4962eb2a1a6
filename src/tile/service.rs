//! Relay Service for forwarding tile requests upstream.
//!
//! The RelayService is the main entry point for tile requests. It handles:
//! - Tile path validation
//! - Upstream URL construction (the only place the credential is used)
//! - A single bounded retry for transient failures
//! - Status and content-type validation of the upstream answer
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         RelayService                            │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │                    fetch_tile()                         │    │
//! │  │  1. Validate path     3. GET upstream (retry once)      │    │
//! │  │  2. Build URL         4. Check status, body, type       │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! │           │                                   │                 │
//! │           ▼                                   ▼                 │
//! │    ┌──────────────┐                  ┌──────────────────┐       │
//! │    │ RelaySettings│                  │   TileUpstream   │       │
//! │    │ (base, key)  │                  │   (transport)    │       │
//! │    └──────────────┘                  └──────────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderValue, StatusCode};
use tracing::{debug, warn};
use url::Url;

use crate::credential::ApiKey;
use crate::error::{RelayError, UpstreamError};
use crate::upstream::{TileUpstream, UpstreamResponse};

use super::path::TilePath;

/// Default upstream base URL (Planet basemap tiles).
pub const DEFAULT_UPSTREAM_URL: &str = "https://tiles.planet.com/basemaps/v1/planet-tiles";

/// Query parameter carrying the credential on the outbound leg.
pub const API_KEY_PARAM: &str = "api_key";

/// Content type used when the upstream omits or mangles its own.
pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Pause before the single retry of a transient failure.
pub const RETRY_DELAY: Duration = Duration::from_millis(200);

// =============================================================================
// Tile Request
// =============================================================================

/// A request for one tile, as seen by the map client.
///
/// Holds only the validated path. The credential is never part of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileRequest {
    /// Tile sub-path, e.g. `<mosaic>/gmap/<z>/<x>/<y>.png`
    pub path: TilePath,
}

impl TileRequest {
    /// Validate a raw path and build a request.
    pub fn parse(raw: &str) -> Result<Self, RelayError> {
        Ok(Self {
            path: TilePath::parse(raw)?,
        })
    }
}

// =============================================================================
// Tile Response
// =============================================================================

/// Successful upstream answer, ready to hand back to the client.
#[derive(Debug, Clone)]
pub struct TileResponse {
    /// Upstream status (always 2xx)
    pub status: StatusCode,

    /// Validated content type
    pub content_type: HeaderValue,

    /// Body bytes, verbatim
    pub data: Bytes,

    /// Number of upstream calls made (1 or 2)
    pub attempts: u32,
}

// =============================================================================
// Relay Settings
// =============================================================================

/// Immutable per-process relay settings.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Upstream base URL, without query or fragment
    pub base_url: Url,

    /// Provider credential
    pub api_key: ApiKey,

    /// Retry transient failures once
    pub retry_transient: bool,
}

impl RelaySettings {
    /// Settings with retry enabled.
    pub fn new(base_url: Url, api_key: ApiKey) -> Self {
        Self {
            base_url,
            api_key,
            retry_transient: true,
        }
    }

    /// Enable or disable the single retry.
    pub fn with_retry(mut self, enabled: bool) -> Self {
        self.retry_transient = enabled;
        self
    }
}

// =============================================================================
// Relay Service
// =============================================================================

/// Service forwarding tile requests to the upstream provider.
///
/// Cheap to clone; clones share the settings and the transport.
///
/// # Example
///
/// ```ignore
/// use tile_relay::tile::{RelayService, RelaySettings};
/// use tile_relay::upstream::HttpUpstream;
///
/// let settings = RelaySettings::new(base_url, api_key);
/// let upstream = HttpUpstream::new(Duration::from_secs(30), Duration::from_secs(10), None)?;
/// let relay = RelayService::new(upstream, settings);
///
/// let tile = relay.fetch_tile("global_monthly_2024_08_mosaic/gmap/10/330/553.png").await?;
/// println!("{} bytes of {:?}", tile.data.len(), tile.content_type);
/// ```
pub struct RelayService<U: TileUpstream> {
    upstream: Arc<U>,
    settings: Arc<RelaySettings>,
}

impl<U: TileUpstream> Clone for RelayService<U> {
    fn clone(&self) -> Self {
        Self {
            upstream: Arc::clone(&self.upstream),
            settings: Arc::clone(&self.settings),
        }
    }
}

impl<U: TileUpstream> RelayService<U> {
    /// Create a relay over the given transport.
    pub fn new(upstream: U, settings: RelaySettings) -> Self {
        Self {
            upstream: Arc::new(upstream),
            settings: Arc::new(settings),
        }
    }

    /// Create a relay over a shared transport.
    pub fn with_shared_upstream(upstream: Arc<U>, settings: RelaySettings) -> Self {
        Self {
            upstream,
            settings: Arc::new(settings),
        }
    }

    /// The relay settings.
    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    /// The transport.
    pub fn upstream(&self) -> &U {
        &self.upstream
    }

    /// Validate a raw tile path and fetch it.
    pub async fn fetch_tile(&self, raw_path: &str) -> Result<TileResponse, RelayError> {
        let request = TileRequest::parse(raw_path)?;
        self.fetch(&request).await
    }

    /// Fetch a validated tile request.
    ///
    /// Makes one upstream call, plus at most one retry when the first failure
    /// is transient and retries are enabled.
    pub async fn fetch(&self, request: &TileRequest) -> Result<TileResponse, RelayError> {
        let url = self.upstream_url(&request.path);
        let max_attempts = if self.settings.retry_transient { 2 } else { 1 };
        let mut attempt = 1;

        loop {
            match self.fetch_once(url.clone()).await {
                Ok(mut response) => {
                    response.attempts = attempt;
                    debug!(
                        tile_path = %request.path,
                        status = response.status.as_u16(),
                        bytes = response.data.len(),
                        attempts = attempt,
                        "Tile relayed"
                    );
                    return Ok(response);
                }
                Err(err) if attempt < max_attempts && err.is_transient() => {
                    warn!(
                        upstream = %self.display_url(&request.path),
                        error = %err,
                        "Transient upstream failure, retrying once"
                    );
                    tokio::time::sleep(RETRY_DELAY).await;
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Build `<base>/<path>?api_key=<key>`.
    pub fn upstream_url(&self, path: &TilePath) -> Url {
        let mut url = self.settings.base_url.clone();
        {
            let joined = format!("{}/{}", url.path().trim_end_matches('/'), path.as_str());
            url.set_path(&joined);
        }
        url.query_pairs_mut()
            .append_pair(API_KEY_PARAM, self.settings.api_key.expose());
        url
    }

    /// The upstream URL without the credential, safe to log or display.
    pub fn display_url(&self, path: &TilePath) -> String {
        format!(
            "{}/{}",
            self.settings.base_url.as_str().trim_end_matches('/'),
            path.as_str()
        )
    }

    async fn fetch_once(&self, url: Url) -> Result<TileResponse, UpstreamError> {
        let response = self.upstream.get(url).await?;
        validate_response(response)
    }
}

/// Turn a raw upstream answer into a tile or an error.
fn validate_response(response: UpstreamResponse) -> Result<TileResponse, UpstreamError> {
    if !response.is_success() {
        return Err(UpstreamError::Status(response.status));
    }

    if response.body.is_empty() {
        return Err(UpstreamError::EmptyBody);
    }

    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::OK);

    Ok(TileResponse {
        status,
        content_type: validate_content_type(response.content_type),
        data: response.body,
        attempts: 1,
    })
}

/// Accept a content type only if it is printable and looks like `type/subtype`.
fn validate_content_type(value: Option<HeaderValue>) -> HeaderValue {
    match value {
        Some(value)
            if value
                .to_str()
                .map(|s| {
                    let essence = s.split(';').next().unwrap_or("").trim();
                    matches!(
                        essence.split_once('/'),
                        Some((t, st)) if !t.is_empty() && !st.is_empty()
                    )
                })
                .unwrap_or(false) =>
        {
            value
        }
        _ => HeaderValue::from_static(FALLBACK_CONTENT_TYPE),
    }
}
