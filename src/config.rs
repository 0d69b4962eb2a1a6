//! Configuration management for the tile relay.
//!
//! This module provides a configuration system that supports:
//! - Command-line arguments via clap
//! - Environment variables with `RELAY_` prefix
//! - A TOML secrets file for the provider credential
//!
//! # Commands
//!
//! - `tile-relay` / `tile-relay serve` - Run the relay
//! - `tile-relay check` - Validate configuration, optionally fetch one tile
//!
//! # Environment Variables
//!
//! - `RELAY_HOST` - Bind address (default: 127.0.0.1)
//! - `RELAY_PORT` - Port (default: 5000)
//! - `RELAY_UPSTREAM_URL` - Upstream tile base URL
//! - `RELAY_API_KEY` - Provider credential (overrides the secrets file)
//! - `RELAY_SECRETS_FILE` - Secrets file path (default: .streamlit/secrets.toml)
//! - `RELAY_TIMEOUT` - Upstream request timeout in seconds (default: 30)
//! - `RELAY_CONNECT_TIMEOUT` - Upstream connect timeout in seconds (default: 10)
//! - `RELAY_MAX_TILE_BYTES` - Largest accepted tile body (default: 16 MiB)
//! - `RELAY_UPSTREAM_PROXY` - HTTP proxy for upstream traffic
//! - `RELAY_CORS_ORIGINS` - Allowed CORS origins, comma-separated

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use url::Url;

use crate::credential::{resolve_api_key, ApiKey, KeySource};
use crate::error::ConfigError;
use crate::tile::{RelaySettings, DEFAULT_UPSTREAM_URL};
use crate::upstream::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_MAX_TILE_BYTES, DEFAULT_TIMEOUT_SECS};

// =============================================================================
// Default Values
// =============================================================================

/// Default bind host. Loopback only; the relay has no inbound access control.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default port.
pub const DEFAULT_PORT: u16 = 5000;

/// Default secrets file, shared with the dashboard.
pub const DEFAULT_SECRETS_FILE: &str = ".streamlit/secrets.toml";

/// Upper bound for the request timeout, in seconds.
pub const MAX_TIMEOUT_SECS: u64 = 300;

/// Upper bound for the connect timeout, in seconds.
pub const MAX_CONNECT_TIMEOUT_SECS: u64 = 60;

// =============================================================================
// CLI
// =============================================================================

/// Tile Relay - forwards basemap tile requests with an injected API key.
///
/// Keeps the provider credential out of the browser: map clients request
/// `/tiles/<mosaic>/gmap/<z>/<x>/<y>.png` and the relay adds the key on the
/// way out.
#[derive(Parser, Debug, Clone)]
#[command(name = "tile-relay")]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Serve options when no subcommand is given.
    #[command(flatten)]
    pub serve: ServeConfig,
}

impl Cli {
    /// Resolve the command, defaulting to `serve`.
    pub fn into_command(self) -> Command {
        self.command.unwrap_or(Command::Serve(self.serve))
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the relay (default).
    Serve(ServeConfig),

    /// Check configuration and upstream reachability.
    Check(CheckConfig),
}

// =============================================================================
// Upstream Arguments
// =============================================================================

/// Upstream and credential options, shared by `serve` and `check`.
#[derive(Args, Debug, Clone)]
pub struct UpstreamArgs {
    /// Base URL of the upstream tile service.
    #[arg(long, default_value = DEFAULT_UPSTREAM_URL, env = "RELAY_UPSTREAM_URL")]
    pub upstream_url: String,

    /// Provider API key. Takes precedence over the secrets file.
    #[arg(long, env = "RELAY_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// TOML secrets file holding `[planet].api_key`.
    #[arg(long, default_value = DEFAULT_SECRETS_FILE, env = "RELAY_SECRETS_FILE")]
    pub secrets_file: PathBuf,

    /// Upstream request timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS, env = "RELAY_TIMEOUT")]
    pub timeout: u64,

    /// Upstream connect timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS, env = "RELAY_CONNECT_TIMEOUT")]
    pub connect_timeout: u64,

    /// Disable the single retry of transient upstream failures.
    #[arg(long, default_value_t = false)]
    pub no_retry: bool,

    /// Largest tile body accepted from the upstream, in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_TILE_BYTES, env = "RELAY_MAX_TILE_BYTES")]
    pub max_tile_bytes: usize,

    /// Send upstream traffic through this HTTP proxy. System proxy
    /// variables are not used.
    #[arg(long, env = "RELAY_UPSTREAM_PROXY", hide_env_values = true)]
    pub upstream_proxy: Option<String>,
}

impl UpstreamArgs {
    /// Validate everything except the credential.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base_url()?;

        if self.timeout == 0 || self.timeout > MAX_TIMEOUT_SECS {
            return Err(ConfigError::InvalidSetting {
                name: "timeout",
                reason: format!("must be between 1 and {} seconds", MAX_TIMEOUT_SECS),
            });
        }

        if self.connect_timeout == 0 || self.connect_timeout > MAX_CONNECT_TIMEOUT_SECS {
            return Err(ConfigError::InvalidSetting {
                name: "connect_timeout",
                reason: format!("must be between 1 and {} seconds", MAX_CONNECT_TIMEOUT_SECS),
            });
        }

        if self.connect_timeout > self.timeout {
            return Err(ConfigError::InvalidSetting {
                name: "connect_timeout",
                reason: "must not exceed timeout".to_string(),
            });
        }

        if self.max_tile_bytes == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "max_tile_bytes",
                reason: "must be at least 1".to_string(),
            });
        }

        if let Some(ref proxy) = self.upstream_proxy {
            let valid = Url::parse(proxy)
                .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
                .unwrap_or(false);
            if !valid {
                return Err(ConfigError::InvalidSetting {
                    name: "upstream_proxy",
                    reason: "must be an http:// or https:// URL".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Parse and check the upstream base URL.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        parse_upstream_url(&self.upstream_url)
    }

    /// Load the credential from the flag/env or the secrets file.
    pub fn api_key(&self) -> Result<(ApiKey, KeySource), ConfigError> {
        resolve_api_key(self.api_key.as_deref(), &self.secrets_file)
    }

    /// Upstream request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Upstream connect timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Validate and build the relay settings, loading the credential.
    pub fn relay_settings(&self) -> Result<(RelaySettings, KeySource), ConfigError> {
        self.validate()?;
        let base_url = self.base_url()?;
        let (api_key, source) = self.api_key()?;
        let settings = RelaySettings::new(base_url, api_key).with_retry(!self.no_retry);
        Ok((settings, source))
    }
}

/// Parse an upstream base URL: http(s), with a host, no query, no fragment.
///
/// Errors never quote `raw`: a pasted provider URL may carry the key.
pub fn parse_upstream_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUpstreamUrl {
        url: "<unparseable>".to_string(),
        reason: e.to_string(),
    })?;

    let invalid = |reason: &str| ConfigError::InvalidUpstreamUrl {
        url: redacted_url(&url),
        reason: reason.to_string(),
    };

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(invalid("scheme must be http or https"));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host"));
    }
    if url.query().is_some() {
        return Err(invalid("must not contain a query string"));
    }
    if url.fragment().is_some() {
        return Err(invalid("must not contain a fragment"));
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(invalid("must not contain credentials"));
    }

    Ok(url)
}

/// Scheme, host, port and path of a URL. Userinfo, query and fragment are dropped.
fn redacted_url(url: &Url) -> String {
    let mut shown = format!("{}://{}", url.scheme(), url.host_str().unwrap_or(""));
    if let Some(port) = url.port() {
        shown.push_str(&format!(":{}", port));
    }
    shown.push_str(url.path());
    shown
}

// =============================================================================
// Serve Configuration
// =============================================================================

/// Options for running the relay.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    /// Host address to bind to.
    #[arg(long, default_value = DEFAULT_HOST, env = "RELAY_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "RELAY_PORT")]
    pub port: u16,

    #[command(flatten)]
    pub upstream: UpstreamArgs,

    /// Allowed CORS origins (comma-separated). Any origin if not set.
    #[arg(long, env = "RELAY_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate everything except the credential.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::InvalidSetting {
                name: "host",
                reason: "must not be empty".to_string(),
            });
        }

        self.upstream.validate()
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        match self.host.parse::<IpAddr>() {
            Ok(IpAddr::V6(ip)) => format!("[{}]:{}", ip, self.port),
            _ => format!("{}:{}", self.host, self.port),
        }
    }

    /// Whether the bind host only accepts local connections.
    pub fn is_loopback(&self) -> bool {
        if self.host.eq_ignore_ascii_case("localhost") {
            return true;
        }
        self.host
            .parse::<IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false)
    }
}

// =============================================================================
// Check Configuration
// =============================================================================

/// Options for the `check` command.
#[derive(Args, Debug, Clone)]
pub struct CheckConfig {
    #[command(flatten)]
    pub upstream: UpstreamArgs,

    /// Fetch this tile path through the relay logic and report the result.
    #[arg(long)]
    pub test_tile: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

// =============================================================================
// Tests
// =============================================================================
