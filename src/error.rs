use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating startup configuration.
///
/// All of these are fatal: the relay refuses to bind a port when any of them
/// occurs. None of the messages include the credential value.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// No credential was supplied by flag, environment or secrets file
    #[error(
        "No API key configured. Set --api-key or RELAY_API_KEY, or add [planet].api_key to {}",
        path.display()
    )]
    MissingApiKey { path: PathBuf },

    /// The credential is present but not in an acceptable shape
    #[error("Invalid API key: {reason}")]
    InvalidApiKey { reason: String },

    /// The secrets file exists but could not be read
    #[error("Failed to read secrets file {}: {message}", path.display())]
    SecretsUnreadable { path: PathBuf, message: String },

    /// The secrets file is not valid TOML or has the wrong shape
    #[error("Malformed secrets file {}: {message}", path.display())]
    SecretsMalformed { path: PathBuf, message: String },

    /// The upstream base URL is not usable. `url` holds scheme, host and
    /// path only; query and userinfo may carry credentials.
    #[error("Invalid upstream URL '{url}': {reason}")]
    InvalidUpstreamUrl { url: String, reason: String },

    /// Any other out-of-range setting
    #[error("Invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },
}

/// Reasons a caller-supplied tile path is rejected before any outbound call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TilePathError {
    /// Path is empty
    #[error("Tile path is empty")]
    Empty,

    /// Path exceeds the maximum accepted length
    #[error("Tile path is too long: {len} bytes (max {max})")]
    TooLong { len: usize, max: usize },

    /// Path contains a character outside the allowed set
    #[error("Tile path contains disallowed character {ch:?} at byte {position}")]
    DisallowedCharacter { ch: char, position: usize },

    /// Path starts or ends with a separator
    #[error("Tile path must not start or end with '/'")]
    BoundarySeparator,

    /// Path contains an empty, "." or ".." segment
    #[error("Tile path contains an invalid segment: {segment:?}")]
    InvalidSegment { segment: String },
}

/// Errors from the outbound leg of a tile fetch.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    /// The upstream did not answer within the configured timeout
    #[error("Upstream request timed out: {0}")]
    Timeout(String),

    /// Connection, DNS or protocol failure
    #[error("Upstream connection error: {0}")]
    Connection(String),

    /// The upstream answered with a non-success status
    #[error("Upstream returned status {0}")]
    Status(u16),

    /// The upstream answered with success but no bytes
    #[error("Upstream returned an empty body")]
    EmptyBody,

    /// The upstream body exceeded the configured size limit
    #[error("Upstream body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },
}

impl UpstreamError {
    /// Whether a single retry is worthwhile.
    ///
    /// Transport failures and gateway-style 5xx responses are transient.
    /// Client errors never are.
    pub fn is_transient(&self) -> bool {
        match self {
            UpstreamError::Timeout(_) | UpstreamError::Connection(_) => true,
            UpstreamError::Status(code) => matches!(code, 502..=504),
            UpstreamError::EmptyBody | UpstreamError::BodyTooLarge { .. } => false,
        }
    }
}

/// Per-request errors surfaced by the relay service.
#[derive(Debug, Clone, Error)]
pub enum RelayError {
    /// The request was rejected locally
    #[error("Invalid tile path: {0}")]
    InvalidPath(#[from] TilePathError),

    /// The outbound fetch failed
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}
