//! Control-session handlers: start, inspect, end, and send commands.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::dto::{SendCommandRequest, StartSessionRequest};
use crate::app_state::AppState;
use crate::domain::{ControlSession, Operator, RobotId, SessionState};
use crate::error::{ErrorResponse, GatewayError};
use crate::service::{CommandReceipt, SessionGrant};

/// `POST /robots/{id}/session`: Take exclusive control.
///
/// # Errors
///
/// Returns [`GatewayError::AccessDenied`] below `control`, or
/// [`GatewayError::NotAvailable`] when the robot is held, faulted, in
/// maintenance, or retired.
#[utoipa::path(
    post,
    path = "/api/v1/robots/{id}/session",
    tag = "Sessions",
    summary = "Start a control session",
    description = "Grants the caller the robot's exclusive control lock, then connects best-effort. A failed connect is reported in `connection` and does not release the lock.",
    request_body = StartSessionRequest,
    params(
        ("id" = RobotId, Path, description = "Robot UUID"),
    ),
    responses(
        (status = 201, description = "Session started", body = SessionGrant),
        (status = 403, description = "Control access required", body = ErrorResponse),
        (status = 409, description = "Robot not available", body = ErrorResponse),
    )
)]
pub async fn start_session(
    State(state): State<AppState>,
    operator: Operator,
    Path(id): Path<RobotId>,
    Json(req): Json<StartSessionRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let grant = state
        .authority
        .start_session(id, operator.user_id, req.mode, req.urdf_ref)
        .await?;
    Ok((StatusCode::CREATED, Json(grant)))
}

/// `GET /robots/{id}/session`: Session state.
///
/// # Errors
///
/// Returns [`GatewayError::AccessDenied`] below `view`.
#[utoipa::path(
    get,
    path = "/api/v1/robots/{id}/session",
    tag = "Sessions",
    summary = "Get session state",
    params(
        ("id" = RobotId, Path, description = "Robot UUID"),
    ),
    responses(
        (status = 200, description = "Available, held, or faulted", body = SessionState),
        (status = 403, description = "View access required", body = ErrorResponse),
    )
)]
pub async fn get_session(
    State(state): State<AppState>,
    operator: Operator,
    Path(id): Path<RobotId>,
) -> Result<impl IntoResponse, GatewayError> {
    Ok(Json(state.authority.session_state(id, operator.user_id).await?))
}

/// `DELETE /robots/{id}/session`: Release control.
///
/// # Errors
///
/// Returns [`GatewayError::AccessDenied`] below `control` and
/// [`GatewayError::NotHolder`] unless the caller holds the session.
#[utoipa::path(
    delete,
    path = "/api/v1/robots/{id}/session",
    tag = "Sessions",
    summary = "End a control session",
    description = "Sends a best-effort stop, closes the link, and releases the lock.",
    params(
        ("id" = RobotId, Path, description = "Robot UUID"),
    ),
    responses(
        (status = 200, description = "The ended session", body = ControlSession),
        (status = 403, description = "Control access required", body = ErrorResponse),
        (status = 409, description = "Caller does not hold the session", body = ErrorResponse),
    )
)]
pub async fn end_session(
    State(state): State<AppState>,
    operator: Operator,
    Path(id): Path<RobotId>,
) -> Result<impl IntoResponse, GatewayError> {
    Ok(Json(state.authority.end_session(id, operator.user_id).await?))
}

/// `POST /robots/{id}/commands`: Forward a command from the holder.
///
/// # Errors
///
/// Returns [`GatewayError::NotHolder`] for anyone but the holder, or a
/// transport error from the link.
#[utoipa::path(
    post,
    path = "/api/v1/robots/{id}/commands",
    tag = "Sessions",
    summary = "Send a command",
    description = "Translates a manual, gesture, stop, or emergency-stop command into a velocity and forwards it to the robot.",
    request_body = SendCommandRequest,
    params(
        ("id" = RobotId, Path, description = "Robot UUID"),
    ),
    responses(
        (status = 200, description = "Command forwarded", body = CommandReceipt),
        (status = 409, description = "Caller does not hold the session", body = ErrorResponse),
        (status = 502, description = "Robot link failure", body = ErrorResponse),
        (status = 504, description = "Send timed out", body = ErrorResponse),
    )
)]
pub async fn send_command(
    State(state): State<AppState>,
    operator: Operator,
    Path(id): Path<RobotId>,
    Json(req): Json<SendCommandRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let receipt = state
        .authority
        .send_command(id, operator.user_id, req.command)
        .await?;
    Ok(Json(receipt))
}

/// Session routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/robots/{id}/session",
            post(start_session).get(get_session).delete(end_session),
        )
        .route("/robots/{id}/commands", post(send_command))
}
