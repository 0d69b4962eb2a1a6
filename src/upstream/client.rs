use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use url::Url;

use super::{TileUpstream, UpstreamResponse};
use crate::error::{ConfigError, UpstreamError};

/// Default overall request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default cap on a tile body (16 MiB).
pub const DEFAULT_MAX_TILE_BYTES: usize = 16 * 1024 * 1024;

/// reqwest-backed implementation of [`TileUpstream`].
///
/// Holds a single pooled client shared by every request.
#[derive(Clone)]
pub struct HttpUpstream {
    client: Client,
    max_body_bytes: usize,
}

impl HttpUpstream {
    /// Create a client with the given overall and connect timeouts.
    ///
    /// System proxy variables are ignored; outbound traffic goes through
    /// `proxy` when given and directly otherwise.
    pub fn new(
        timeout: Duration,
        connect_timeout: Duration,
        proxy: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .user_agent(concat!("tile-relay/", env!("CARGO_PKG_VERSION")));

        builder = match proxy {
            Some(url) => {
                let proxy = reqwest::Proxy::all(url).map_err(|e| ConfigError::InvalidSetting {
                    name: "upstream_proxy",
                    reason: e.to_string(),
                })?;
                builder.proxy(proxy)
            }
            None => builder.no_proxy(),
        };

        let client = builder.build().map_err(|e| ConfigError::InvalidSetting {
            name: "http_client",
            reason: e.to_string(),
        })?;

        Ok(Self {
            client,
            max_body_bytes: DEFAULT_MAX_TILE_BYTES,
        })
    }

    /// Reject success bodies larger than `limit` bytes.
    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }
}

#[async_trait]
impl TileUpstream for HttpUpstream {
    async fn get(&self, url: Url) -> Result<UpstreamResponse, UpstreamError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        let content_type = response.headers().get(CONTENT_TYPE).cloned();

        // Error bodies are discarded; the status is all the caller gets
        if !response.status().is_success() {
            return Ok(UpstreamResponse {
                status,
                content_type,
                body: Bytes::new(),
            });
        }

        let limit = self.max_body_bytes;
        if response.content_length().is_some_and(|len| len > limit as u64) {
            return Err(UpstreamError::BodyTooLarge { limit });
        }

        // Content-Length may be absent or wrong, so count as we read
        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(transport_error)? {
            if body.len() + chunk.len() > limit {
                return Err(UpstreamError::BodyTooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }
        let body = body.freeze();

        Ok(UpstreamResponse {
            status,
            content_type,
            body,
        })
    }
}

/// Map a reqwest error, dropping the URL (it carries the credential).
fn transport_error(err: reqwest::Error) -> UpstreamError {
    let err = err.without_url();
    let message = describe(&err);

    if err.is_timeout() {
        UpstreamError::Timeout(message)
    } else {
        UpstreamError::Connection(message)
    }
}

/// Render an error with its source chain, e.g. "error sending request: connection refused".
fn describe(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
