//! Robot link handlers: connect, disconnect, status.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::dto::DisconnectResponse;
use crate::app_state::AppState;
use crate::domain::{Operator, RobotId};
use crate::error::{ErrorResponse, GatewayError};
use crate::service::ConnectionStatus;

/// `POST /robots/{id}/connection`: Open the robot's link.
///
/// # Errors
///
/// Returns [`GatewayError::AlreadyConnected`],
/// [`GatewayError::ProtocolUnavailable`], or a connect failure.
#[utoipa::path(
    post,
    path = "/api/v1/robots/{id}/connection",
    tag = "Connections",
    summary = "Connect a robot",
    description = "Opens the protocol link for monitoring without taking a session.",
    params(
        ("id" = RobotId, Path, description = "Robot UUID"),
    ),
    responses(
        (status = 200, description = "Link open", body = ConnectionStatus),
        (status = 409, description = "Already connected", body = ErrorResponse),
        (status = 503, description = "Protocol disabled", body = ErrorResponse),
    )
)]
pub async fn connect_robot(
    State(state): State<AppState>,
    operator: Operator,
    Path(id): Path<RobotId>,
) -> Result<impl IntoResponse, GatewayError> {
    Ok(Json(state.authority.connect_robot(id, operator.user_id).await?))
}

/// `GET /robots/{id}/connection`: Connection status.
///
/// # Errors
///
/// Returns [`GatewayError::AccessDenied`] below `view`.
#[utoipa::path(
    get,
    path = "/api/v1/robots/{id}/connection",
    tag = "Connections",
    summary = "Get connection status",
    params(
        ("id" = RobotId, Path, description = "Robot UUID"),
    ),
    responses(
        (status = 200, description = "Connection status", body = ConnectionStatus),
    )
)]
pub async fn connection_status(
    State(state): State<AppState>,
    operator: Operator,
    Path(id): Path<RobotId>,
) -> Result<impl IntoResponse, GatewayError> {
    Ok(Json(
        state.authority.connection_status(id, operator.user_id).await?,
    ))
}

/// `DELETE /robots/{id}/connection`: Close the robot's link.
///
/// # Errors
///
/// Returns [`GatewayError::NotHolder`] while another user holds the
/// session.
#[utoipa::path(
    delete,
    path = "/api/v1/robots/{id}/connection",
    tag = "Connections",
    summary = "Disconnect a robot",
    description = "Closes the link. Idempotent: disconnecting an unconnected robot succeeds with `disconnected: false`.",
    params(
        ("id" = RobotId, Path, description = "Robot UUID"),
    ),
    responses(
        (status = 200, description = "Disconnect result", body = DisconnectResponse),
        (status = 409, description = "Another user holds the session", body = ErrorResponse),
    )
)]
pub async fn disconnect_robot(
    State(state): State<AppState>,
    operator: Operator,
    Path(id): Path<RobotId>,
) -> Result<impl IntoResponse, GatewayError> {
    let disconnected = state.authority.disconnect_robot(id, operator.user_id).await?;
    Ok(Json(DisconnectResponse {
        robot_id: id,
        disconnected,
    }))
}

/// Connection routes.
pub fn routes() -> Router<AppState> {
    Router::new().route(
        "/robots/{id}/connection",
        post(connect_robot)
            .get(connection_status)
            .delete(disconnect_robot),
    )
}
