//! Emergency-stop handlers: one robot or the whole fleet.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;

use crate::api::dto::EmergencyStopResponse;
use crate::app_state::AppState;
use crate::domain::{Operator, RobotId};
use crate::error::{ErrorResponse, GatewayError};
use crate::service::FleetStopReport;

/// `POST /robots/{id}/emergency-stop`: Stop and fault one robot.
///
/// # Errors
///
/// Returns [`GatewayError::AccessDenied`] unless the caller is a fleet or
/// robot admin. A transport error means the robot is faulted but the stop
/// frame may not have arrived.
#[utoipa::path(
    post,
    path = "/api/v1/robots/{id}/emergency-stop",
    tag = "Emergency",
    summary = "Emergency-stop a robot",
    description = "Ends any session, marks the robot `error`, then sends a zero velocity. The link stays open.",
    params(
        ("id" = RobotId, Path, description = "Robot UUID"),
    ),
    responses(
        (status = 200, description = "Stop delivered", body = EmergencyStopResponse),
        (status = 403, description = "Admin required", body = ErrorResponse),
        (status = 409, description = "Robot not connected; it is faulted", body = ErrorResponse),
        (status = 502, description = "Stop not delivered; robot is faulted", body = ErrorResponse),
    )
)]
pub async fn emergency_stop(
    State(state): State<AppState>,
    operator: Operator,
    Path(id): Path<RobotId>,
) -> Result<impl IntoResponse, GatewayError> {
    state.authority.emergency_stop(id, operator).await?;
    Ok(Json(EmergencyStopResponse {
        robot_id: id,
        executed_by: operator.user_id,
        timestamp: Utc::now(),
    }))
}

/// `POST /fleet/emergency-stop`: Stop every actively controlled robot.
///
/// # Errors
///
/// Returns [`GatewayError::AccessDenied`] unless the caller is a fleet
/// admin. Per-robot failures are reported in the body, never as an error.
#[utoipa::path(
    post,
    path = "/api/v1/fleet/emergency-stop",
    tag = "Emergency",
    summary = "Fleet emergency stop",
    description = "Concurrently emergency-stops every robot with a held session and reports per-robot outcomes.",
    responses(
        (status = 200, description = "Per-robot results", body = FleetStopReport),
        (status = 403, description = "Fleet admin required", body = ErrorResponse),
    )
)]
pub async fn emergency_stop_all(
    State(state): State<AppState>,
    operator: Operator,
) -> Result<impl IntoResponse, GatewayError> {
    Ok(Json(state.authority.emergency_stop_all(operator).await?))
}

/// Emergency-stop routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/robots/{id}/emergency-stop", post(emergency_stop))
        .route("/fleet/emergency-stop", post(emergency_stop_all))
}
