//! File playback server
//!
//! Hosts the fileplay engine behind a small HTTP control surface and sends
//! the paced media of each session as RTP over UDP.

mod config;
mod error;
mod http;
mod rtp;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ServerConfig};
use crate::error::{Result, ServerError};
use crate::http::create_router;
use crate::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
const APP_NAME: &str = "fileplay-server";

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let loaded = ServerConfig::load(&config_path);
    let config = match &loaded {
        Ok(Some(config)) => config.clone(),
        _ => ServerConfig::default(),
    };

    init_logging(&config);

    tracing::info!("{} v{} starting", APP_NAME, VERSION);
    match loaded {
        Ok(Some(_)) => tracing::info!(path = %config_path, "configuration loaded"),
        Ok(None) => tracing::info!(path = %config_path, "no config file, using defaults"),
        Err(e) => tracing::warn!(
            "Failed to load config file {}: {}. Using defaults.",
            config_path,
            e
        ),
    }
    tracing::debug!("Configuration: {:?}", config);

    // Initialize FFmpeg and install log filter
    fileplay_lib::init().map_err(|e| ServerError::Internal(e.to_string()))?;
    fileplay_lib::install_log_filter();
    tracing::info!("FFmpeg version: {}", fileplay_lib::ffmpeg_version_info());

    let state = Arc::new(AppState::new(config.clone())?);
    let app = create_router(Arc::clone(&state));

    let addr: SocketAddr = config
        .socket_addr()
        .parse()
        .map_err(|e| ServerError::Config(format!("invalid listen address: {}", e)))?;
    tracing::info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Blocking join of the dispatcher thread
    let engine_state = Arc::clone(&state);
    tokio::task::spawn_blocking(move || engine_state.engine.shutdown())
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))?;
    tracing::info!("{} stopped", APP_NAME);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Initialize logging with tracing
fn init_logging(config: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.log_level;
        format!(
            "fileplay_server={level},fileplay_lib={level},tower_http={level}",
            level = level
        )
        .into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}
