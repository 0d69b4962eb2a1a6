//! Tile Relay - forwards basemap tile requests with an injected API key.
//!
//! This binary loads the credential, starts the HTTP server and configures
//! all components.

use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tile_relay::{
    build_relay,
    config::{CheckConfig, Cli, Command, ServeConfig},
    server::{create_router, RouterConfig},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Check(config) => run_check(config).await,
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    // The credential must load before anything is bound
    let (relay, key_source) = match build_relay(&config.upstream) {
        Ok(built) => built,
        Err(e) => {
            error!("Configuration error: {}", e);
            error!("Refusing to start without a usable API key");
            return ExitCode::FAILURE;
        }
    };

    info!("Tile Relay v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Upstream: {}", relay.settings().base_url);
    info!("  API key: configured ({})", key_source);
    info!(
        "  Timeouts: {}s request, {}s connect",
        config.upstream.timeout, config.upstream.connect_timeout
    );
    if config.upstream.no_retry {
        info!("  Retry: disabled");
    } else {
        info!("  Retry: once on transient failures");
    }

    if !config.is_loopback() {
        warn!("  Bind host {} is not a loopback address", config.host);
        warn!("  The relay performs NO inbound access control; anyone who can reach");
        warn!("  this port can spend the configured API key");
    }

    let router = create_router(relay, build_router_config(&config));

    let addr = config.bind_address();

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Relay listening on: http://{}", addr);
    info!("");
    info!("  Point the map layer at:");
    info!("    http://{}/tiles/<mosaic>/gmap/{{z}}/{{x}}/{{y}}.png", addr);
    info!("────────────────────────────────────────────────────────────────");
    info!("");

    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Relay stopped");
    ExitCode::SUCCESS
}

/// Resolve when Ctrl+C or SIGTERM arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C), shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "tile_relay=debug,tower_http=debug"
    } else {
        "tile_relay=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = RouterConfig::new();

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config.with_tracing(!config.no_tracing)
}

// =============================================================================
// Check Command
// =============================================================================

async fn run_check(config: CheckConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    println!("Tile Relay Configuration Check");
    println!("═══════════════════════════════");
    println!();

    if let Err(e) = config.upstream.validate() {
        println!("✗ Settings: {}", e);
        return ExitCode::FAILURE;
    }
    println!("✓ Upstream: {}", config.upstream.upstream_url);
    println!(
        "✓ Timeouts: {}s request, {}s connect",
        config.upstream.timeout, config.upstream.connect_timeout
    );

    let (relay, key_source) = match build_relay(&config.upstream) {
        Ok(built) => built,
        Err(e) => {
            println!("✗ API key: {}", e);
            return ExitCode::FAILURE;
        }
    };
    println!("✓ API key: loaded from {}", key_source);

    if let Some(ref tile_path) = config.test_tile {
        println!();
        print!("Fetching tile '{}'... ", tile_path);

        match relay.fetch_tile(tile_path).await {
            Ok(tile) => {
                println!("✓ {}", tile.status);
                println!("  Content-Type: {}", tile.content_type.to_str().unwrap_or("?"));
                println!("  Size: {} bytes", tile.data.len());
                if tile.attempts > 1 {
                    println!("  Attempts: {}", tile.attempts);
                }
            }
            Err(e) => {
                println!("✗ failed");
                println!();
                println!("Error: {}", e);
                println!();
                println!("Please check:");
                println!("  - The API key is valid for this provider");
                println!("  - The mosaic name and z/x/y coordinates exist");
                println!("  - The upstream URL is reachable from this machine");
                return ExitCode::FAILURE;
            }
        }
    }

    println!();
    println!("═══════════════════════════════");
    println!("✓ All checks passed!");

    ExitCode::SUCCESS
}
