//! tw-server - Track enrichment service
//!
//! Fetches recent plays from Last.fm, attaches album art, a five-color
//! palette and (for small art) an inline data URI, and serves them in
//! index ranges behind a one-second coalescing cache.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tw_common::config::load_config;

use tw_server::{build_router, AppState};

/// Command-line arguments for tw-server
#[derive(Parser, Debug)]
#[command(name = "tw-server")]
#[command(about = "Enriched listening-history service")]
#[command(version)]
struct Args {
    /// Path to config file (defaults to TW_CONFIG, then the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "TW_PORT")]
    port: Option<u16>,

    /// Address to bind
    #[arg(long, env = "TW_BIND")]
    bind: Option<String>,

    /// Last.fm user whose history is served
    #[arg(long, env = "LASTFM_USERNAME")]
    lastfm_user: Option<String>,

    /// Last.fm API key
    #[arg(long, env = "LASTFM_API_KEY", hide_env_values = true)]
    lastfm_api_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is loaded first so its log level can seed the filter
    let config = load_config(args.config.as_deref());
    let level = config
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("tw_server={level},tw_common={level},tower_http={level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = config.context("Failed to load configuration")?;

    info!(
        "Starting tw-server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if args.lastfm_user.is_some() {
        config.lastfm.username = args.lastfm_user;
    }
    if args.lastfm_api_key.is_some() {
        config.lastfm.api_key = args.lastfm_api_key;
    }

    if config.lastfm.credentials().is_none() {
        warn!("Last.fm credentials not set; history requests will fail until configured");
    }

    let state = AppState::from_config(&config).context("Failed to initialize upstream clients")?;
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
