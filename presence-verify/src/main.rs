//! presence-verify - attendance verification service
//!
//! Serves the verification workflow over HTTP for the surrounding
//! dashboard: open a session, relay QR/location/photo results from the
//! device, submit, and read back recorded attendance.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use presence_common::config::ConfigResolver;
use presence_verify::clock::SystemClock;
use presence_verify::{build_router, ip_lookup_from_config, AppState};
use tokio::signal;
use tracing::info;

/// Command-line arguments for presence-verify
#[derive(Parser, Debug)]
#[command(name = "presence-verify")]
#[command(about = "Multi-factor attendance verification service")]
#[command(version)]
struct Args {
    /// Config file (overrides PRESENCE_CONFIG and the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "PRESENCE_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = ConfigResolver::new(args.config.clone())
        .load()
        .context("Failed to load configuration")?;

    // Logging level from config unless RUST_LOG says otherwise
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("{},tower_http=info", config.logging.level))
    });
    match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    info!(
        "Starting presence-verify v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let anchor = config.policy.anchor;
    let window = config.policy.window;
    info!(
        "Geofence: ({}, {}) radius {}m; window {:02}:00-{:02}:00",
        anchor.latitude, anchor.longitude, anchor.radius_meters, window.start_hour, window.end_hour
    );

    let ip_lookup = ip_lookup_from_config(&config).context("Failed to configure IP lookup")?;
    if ip_lookup.is_none() {
        info!("Public IP lookup disabled");
    }

    let state = AppState::new(&config, Arc::new(SystemClock), ip_lookup);
    let app = build_router(state);

    let port = args.port.unwrap_or(config.port);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("presence-verify listening on http://{}", addr);

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
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
