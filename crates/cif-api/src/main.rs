//! # cif-api — Binary Entry Point
//!
//! Starts the Axum HTTP server for the admin asset service.
//! Binds to configurable port (default 8080).

use cif_api::state::{AppConfig, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(config = ?config, "configuration loaded");

    let state = AppState::try_with_config(config).map_err(|e| {
        tracing::error!("State initialization failed: {e}");
        e
    })?;
    tracing::info!(
        backend = state.assets().backend_name(),
        assets = state.assets().len(),
        "asset index hydrated"
    );

    let port = state.config.port;
    let app = cif_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("CIF API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
