//! broadcast-hub server entry point.
//!
//! Starts the Axum HTTP server with the browser front end and the
//! WebSocket endpoint.

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use broadcast_hub::app_state::AppState;
use broadcast_hub::config::{BroadcasterConfig, Cli, LogFormat};
use broadcast_hub::hub::Hub;
use broadcast_hub::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = BroadcasterConfig::load(&cli).context("failed to load configuration")?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }

    // Spin up the hub
    let hub = Hub::spawn();
    let app_state = AppState::new(hub, &config);

    if app_state.origin_policy.is_empty() {
        tracing::warn!("no allowed hosts configured, every websocket upgrade will be refused");
    }

    // Start server
    let host = config.listen_host();
    let listener = tokio::net::TcpListener::bind(&host)
        .await
        .with_context(|| format!("failed to bind {host}"))?;
    tracing::info!(addr = %host, allowed_hosts = ?config.allowed_hosts, "starting HTTP server");

    server::serve(listener, app_state, shutdown_signal())
        .await
        .context("HTTP server error")?;

    tracing::info!(addr = %host, "HTTP server stopped");
    Ok(())
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("interrupt received"),
        () = terminate => tracing::info!("terminate received"),
    }
    tracing::info!("stopping HTTP server");
}
