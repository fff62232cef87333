//! teleop-gateway server entry point.
//!
//! Starts the Axum HTTP server with REST and WebSocket endpoints.

use tracing_subscriber::EnvFilter;

use teleop_gateway::app_state::AppState;
use teleop_gateway::build_app;
use teleop_gateway::config::{GatewayConfig, LogFormat};
use teleop_gateway::protocol::AdapterSet;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = GatewayConfig::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    tracing::info!(addr = %config.listen_addr, "starting teleop-gateway");

    // Build protocol, domain, and service layers
    let adapters = AdapterSet::from_config(&config.transport);
    let app_state = AppState::new(adapters, config.transport.clone(), config.event_bus_capacity);
    let authority = std::sync::Arc::clone(&app_state.authority);

    // Build router
    let app = build_app(app_state, config.request_timeout);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let closed = authority.connections().disconnect_all().await;
    tracing::info!(links = closed, "robot links closed, shutting down");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
