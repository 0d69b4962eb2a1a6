//! Upstream credential handling.
//!
//! The basemap provider authenticates tile requests with an `api_key` query
//! parameter. The key is loaded once at startup, wrapped in [`ApiKey`] so it
//! cannot be printed by accident, and only exposed to the outbound URL
//! builder.
//!
//! # Secrets File
//!
//! The dashboard keeps its secrets in a TOML file:
//!
//! ```toml
//! [planet]
//! api_key = "PLAK..."
//! ```
//!
//! Errors produced while reading this file report line numbers and table
//! names only, never values.

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use toml::{Table, Value};

use crate::error::ConfigError;

/// Table in the secrets file that holds the basemap credential.
pub const SECRETS_TABLE: &str = "planet";

/// Key inside [`SECRETS_TABLE`] holding the credential.
pub const SECRETS_KEY: &str = "api_key";

/// Minimum accepted credential length.
pub const MIN_API_KEY_LEN: usize = 8;

/// Maximum accepted credential length.
pub const MAX_API_KEY_LEN: usize = 256;

// =============================================================================
// API Key
// =============================================================================

/// The upstream provider credential.
///
/// `Debug` and `Display` are redacted. Use [`ApiKey::expose`] to get the raw
/// value when building the outbound request.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Validate and wrap a raw credential.
    ///
    /// Accepts `[A-Za-z0-9_-]` only, between [`MIN_API_KEY_LEN`] and
    /// [`MAX_API_KEY_LEN`] characters.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        if raw.is_empty() {
            return Err(invalid_key("value is empty"));
        }

        if raw.trim() != raw {
            return Err(invalid_key("value has leading or trailing whitespace"));
        }

        if raw.len() < MIN_API_KEY_LEN {
            return Err(invalid_key(format!(
                "value is shorter than {} characters",
                MIN_API_KEY_LEN
            )));
        }

        if raw.len() > MAX_API_KEY_LEN {
            return Err(invalid_key(format!(
                "value is longer than {} characters",
                MAX_API_KEY_LEN
            )));
        }

        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(invalid_key(
                "value may only contain ASCII letters, digits, '_' and '-'",
            ));
        }

        Ok(Self(raw.to_string()))
    }

    /// The raw credential. Only the outbound URL builder should call this.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

fn invalid_key(reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidApiKey {
        reason: reason.into(),
    }
}

// =============================================================================
// Key Source
// =============================================================================

/// Where the credential was loaded from (for the startup log).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// `--api-key` flag or `RELAY_API_KEY`
    Argument,

    /// The TOML secrets file
    SecretsFile(PathBuf),
}

impl fmt::Display for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySource::Argument => f.write_str("argument/environment"),
            KeySource::SecretsFile(path) => write!(f, "secrets file {}", path.display()),
        }
    }
}

/// Resolve the credential from an explicit value or the secrets file.
///
/// An explicit value wins. Otherwise the secrets file must exist and contain
/// a string at `[planet].api_key`.
pub fn resolve_api_key(
    explicit: Option<&str>,
    secrets_file: &Path,
) -> Result<(ApiKey, KeySource), ConfigError> {
    if let Some(raw) = explicit {
        return Ok((ApiKey::parse(raw)?, KeySource::Argument));
    }

    let key = load_from_secrets_file(secrets_file)?;
    Ok((key, KeySource::SecretsFile(secrets_file.to_path_buf())))
}

// =============================================================================
// Secrets File
// =============================================================================

/// Load the credential from a TOML secrets file.
pub fn load_from_secrets_file(path: &Path) -> Result<ApiKey, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ConfigError::MissingApiKey {
                path: path.to_path_buf(),
            });
        }
        Err(e) => {
            return Err(ConfigError::SecretsUnreadable {
                path: path.to_path_buf(),
                message: e.to_string(),
            });
        }
    };

    parse_secrets(&content, path)
}

/// Extract the credential from secrets file content.
pub fn parse_secrets(content: &str, path: &Path) -> Result<ApiKey, ConfigError> {
    let malformed = |message: String| ConfigError::SecretsMalformed {
        path: path.to_path_buf(),
        message,
    };

    // toml's own messages quote the offending source line, which may be the key
    let table: Table = content.parse().map_err(|e: toml::de::Error| {
        let line = e
            .span()
            .map(|span| content[..span.start.min(content.len())].matches('\n').count() + 1);
        match line {
            Some(line) => malformed(format!("invalid TOML near line {}", line)),
            None => malformed("invalid TOML".to_string()),
        }
    })?;

    let missing = || ConfigError::MissingApiKey {
        path: path.to_path_buf(),
    };

    let section = match table.get(SECRETS_TABLE) {
        Some(Value::Table(section)) => section,
        Some(_) => return Err(malformed(format!("[{}] is not a table", SECRETS_TABLE))),
        None => return Err(missing()),
    };

    match section.get(SECRETS_KEY) {
        Some(Value::String(raw)) => ApiKey::parse(raw),
        Some(_) => Err(malformed(format!(
            "{}.{} must be a string",
            SECRETS_TABLE, SECRETS_KEY
        ))),
        None => Err(missing()),
    }
}
