//! chat-relay server entry point.
//!
//! Serves the WebSocket registration path and `/health` until the
//! listener fails or the process receives Ctrl-C.

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use chat_relay::config::{LogFormat, ServerConfig};
use chat_relay::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = ServerConfig::from_env().context("loading configuration")?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    server::run(config, shutdown_signal())
        .await
        .context("chat relay stopped")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
