//! System endpoints: health check and protocol catalog.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app_state::AppState;
use crate::protocol::ProtocolAvailability;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    status: String,
    timestamp: String,
    version: String,
    robots: usize,
    event_subscribers: usize,
}

/// `GET /health`: Service health status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Returns service health status, version, current timestamp, registered robot count, and live event subscribers.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    )
)]
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            robots: state.authority.robots().len().await,
            event_subscribers: state.event_bus.receiver_count(),
        }),
    )
}

/// `GET /config/protocols`: Adapter availability.
#[utoipa::path(
    get,
    path = "/config/protocols",
    tag = "System",
    summary = "List protocol adapters",
    description = "Returns every transport kind with whether its adapter is enabled and, if not, why.",
    responses(
        (status = 200, description = "Protocol catalog", body = Vec<ProtocolAvailability>),
    )
)]
pub async fn protocols_handler(State(state): State<AppState>) -> impl IntoResponse {
    let catalog = state.authority.connections().adapters().catalog();
    (StatusCode::OK, Json(catalog))
}

/// System routes mounted at the root level (not under /api/v1).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/config/protocols", get(protocols_handler))
}
