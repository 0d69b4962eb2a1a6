//! Outbound leg of the relay.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              RelayService               │
//! │   (path validation, URL, retry policy)  │
//! └────────────────────┬────────────────────┘
//!                      │  GET <base>/<tile_path>?api_key=...
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │           TileUpstream Trait            │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │      HttpUpstream (reqwest Client)      │
//! └─────────────────────────────────────────┘
//! ```
//!
//! The trait returns whatever the upstream answered, success or not. Status
//! classification and retries live in the service, so alternative transports
//! (and test doubles) only have to move bytes.

mod client;

use async_trait::async_trait;
use bytes::Bytes;
use http::HeaderValue;
use url::Url;

use crate::error::UpstreamError;

pub use client::{
    HttpUpstream, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_MAX_TILE_BYTES, DEFAULT_TIMEOUT_SECS,
};

/// Raw answer from the upstream tile service.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    /// HTTP status code
    pub status: u16,

    /// `Content-Type` header as sent by the upstream, if any
    pub content_type: Option<HeaderValue>,

    /// Response body. Implementations may leave this empty for non-2xx answers.
    pub body: Bytes,
}

impl UpstreamResponse {
    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A transport able to issue a single GET against the tile provider.
///
/// Implementations must be cheap to share across concurrent requests. A
/// dropped `get` future must abandon the outbound request.
#[async_trait]
pub trait TileUpstream: Send + Sync + 'static {
    /// Issue one GET request.
    ///
    /// Returns `Err` only for transport-level failures. Error messages must
    /// not contain the request URL.
    async fn get(&self, url: Url) -> Result<UpstreamResponse, UpstreamError>;
}
