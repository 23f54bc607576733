mod config;
mod error;
mod handlers;
mod routes;
mod state;

use crate::config::Config;
use crate::state::AppState;
use anyhow::{Context, Result};
use tracing_subscriber::fmt::time::ChronoLocal;

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load application configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    if config.elevenlabs_api_key.is_none() {
        tracing::warn!("ELEVENLABS_API_KEY is not set; text-to-speech routes will fail");
    }

    // --- 3. Build the router ---
    let app = routes::create_router(AppState::from_config(&config));

    let listener = tokio::net::TcpListener::bind(config.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_address))?;
    tracing::info!("Interview API listening on {}", config.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl-C, shutting down...");
            }
        })
        .await?;

    Ok(())
}
