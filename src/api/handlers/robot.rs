//! Robot record handlers: register, list, get, retire, access, faults.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::Utc;

use crate::api::dto::{
    GrantAccessRequest, MaintenanceRequest, PaginationParams, RegisterRobotRequest,
    RevokeAccessResponse, RobotListResponse, RobotStatusResponse,
};
use crate::app_state::AppState;
use crate::domain::{AccessPermission, Operator, RobotId, RobotSummary, UserId};
use crate::error::{ErrorResponse, GatewayError};
use crate::service::RobotView;

/// `POST /robots`: Register a robot owned by the caller.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] for a blank name or a
/// duplicate id.
#[utoipa::path(
    post,
    path = "/api/v1/robots",
    tag = "Robots",
    summary = "Register a robot",
    description = "Registers a robot with its transport settings. The caller becomes the owner and the robot starts offline.",
    request_body = RegisterRobotRequest,
    responses(
        (status = 201, description = "Robot registered", body = RobotSummary),
        (status = 400, description = "Invalid descriptor", body = ErrorResponse),
        (status = 401, description = "Missing identity", body = ErrorResponse),
    )
)]
pub async fn register_robot(
    State(state): State<AppState>,
    operator: Operator,
    Json(req): Json<RegisterRobotRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let robot_id = state
        .authority
        .register_robot(req.into_descriptor(operator.user_id))
        .await?;
    let robot = state.authority.robots().snapshot(robot_id).await?;
    Ok((StatusCode::CREATED, Json(RobotSummary::from(&robot))))
}

/// `GET /robots`: List robots visible to the caller.
///
/// # Errors
///
/// Returns [`GatewayError::Unauthenticated`] without identity headers.
#[utoipa::path(
    get,
    path = "/api/v1/robots",
    tag = "Robots",
    summary = "List robots",
    description = "Returns a paginated list of the robots the caller owns or holds a grant on. Fleet admins see every robot.",
    params(PaginationParams),
    responses(
        (status = 200, description = "Paginated robot list", body = RobotListResponse),
    )
)]
pub async fn list_robots(
    State(state): State<AppState>,
    operator: Operator,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, GatewayError> {
    let robots = state.authority.list_robots(operator).await;
    let (data, pagination) = params.paginate(robots);
    Ok(Json(RobotListResponse { data, pagination }))
}

/// `GET /robots/{id}`: Full robot view.
///
/// # Errors
///
/// Returns [`GatewayError::RobotNotFound`] or [`GatewayError::AccessDenied`].
#[utoipa::path(
    get,
    path = "/api/v1/robots/{id}",
    tag = "Robots",
    summary = "Get robot details",
    description = "Returns status, session state, cached telemetry, last heartbeat, and connection status.",
    params(
        ("id" = RobotId, Path, description = "Robot UUID"),
    ),
    responses(
        (status = 200, description = "Robot details", body = RobotView),
        (status = 403, description = "No view access", body = ErrorResponse),
        (status = 404, description = "Robot not found", body = ErrorResponse),
    )
)]
pub async fn get_robot(
    State(state): State<AppState>,
    operator: Operator,
    Path(id): Path<RobotId>,
) -> Result<impl IntoResponse, GatewayError> {
    Ok(Json(state.authority.robot_view(id, operator).await?))
}

/// `DELETE /robots/{id}`: Retire a robot.
///
/// # Errors
///
/// Returns [`GatewayError::NotAvailable`] while a session is held.
#[utoipa::path(
    delete,
    path = "/api/v1/robots/{id}",
    tag = "Robots",
    summary = "Retire a robot",
    description = "Soft-retires the robot and closes its link. Refused while a session is held.",
    params(
        ("id" = RobotId, Path, description = "Robot UUID"),
    ),
    responses(
        (status = 204, description = "Robot retired"),
        (status = 403, description = "Robot admin required", body = ErrorResponse),
        (status = 409, description = "Robot is in use", body = ErrorResponse),
    )
)]
pub async fn retire_robot(
    State(state): State<AppState>,
    operator: Operator,
    Path(id): Path<RobotId>,
) -> Result<impl IntoResponse, GatewayError> {
    state.authority.retire_robot(id, operator).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `PUT /robots/{id}/access`: Grant or update a user's access level.
///
/// # Errors
///
/// Returns [`GatewayError::AccessDenied`] unless the caller is robot admin.
#[utoipa::path(
    put,
    path = "/api/v1/robots/{id}/access",
    tag = "Access",
    summary = "Grant access",
    request_body = GrantAccessRequest,
    params(
        ("id" = RobotId, Path, description = "Robot UUID"),
    ),
    responses(
        (status = 200, description = "Grant stored", body = AccessPermission),
        (status = 403, description = "Robot admin required", body = ErrorResponse),
    )
)]
pub async fn grant_access(
    State(state): State<AppState>,
    operator: Operator,
    Path(id): Path<RobotId>,
    Json(req): Json<GrantAccessRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let permission = state
        .authority
        .grant_access(id, operator.user_id, req.user_id, req.level)
        .await?;
    Ok(Json(permission))
}

/// `DELETE /robots/{id}/access/{user_id}`: Revoke a grant.
///
/// # Errors
///
/// Returns [`GatewayError::AccessDenied`] unless the caller is robot admin.
#[utoipa::path(
    delete,
    path = "/api/v1/robots/{id}/access/{user_id}",
    tag = "Access",
    summary = "Revoke access",
    description = "Removes a user's grant. Revoking the owner is a no-op.",
    params(
        ("id" = RobotId, Path, description = "Robot UUID"),
        ("user_id" = UserId, Path, description = "User UUID"),
    ),
    responses(
        (status = 200, description = "Revocation result", body = RevokeAccessResponse),
        (status = 403, description = "Robot admin required", body = ErrorResponse),
    )
)]
pub async fn revoke_access(
    State(state): State<AppState>,
    operator: Operator,
    Path((id, user_id)): Path<(RobotId, UserId)>,
) -> Result<impl IntoResponse, GatewayError> {
    let removed = state
        .authority
        .revoke_access(id, operator.user_id, user_id)
        .await?;
    Ok(Json(RevokeAccessResponse {
        robot_id: id,
        user_id,
        removed,
    }))
}

/// `POST /robots/{id}/clear-fault`: Return a faulted robot to service.
///
/// # Errors
///
/// Returns [`GatewayError::AccessDenied`] unless the caller is a fleet or
/// robot admin.
#[utoipa::path(
    post,
    path = "/api/v1/robots/{id}/clear-fault",
    tag = "Robots",
    summary = "Clear fault",
    description = "Moves an `error` robot to `online` when still connected, else `offline`.",
    params(
        ("id" = RobotId, Path, description = "Robot UUID"),
    ),
    responses(
        (status = 200, description = "Resulting status", body = RobotStatusResponse),
        (status = 403, description = "Admin required", body = ErrorResponse),
    )
)]
pub async fn clear_fault(
    State(state): State<AppState>,
    operator: Operator,
    Path(id): Path<RobotId>,
) -> Result<impl IntoResponse, GatewayError> {
    let status = state.authority.clear_fault(id, operator).await?;
    Ok(Json(RobotStatusResponse {
        robot_id: id,
        status,
        timestamp: Utc::now(),
    }))
}

/// `PUT /robots/{id}/maintenance`: Enter or leave maintenance.
///
/// # Errors
///
/// Returns [`GatewayError::NotAvailable`] when a session is held, or
/// [`GatewayError::InvalidRequest`] on a faulted robot.
#[utoipa::path(
    put,
    path = "/api/v1/robots/{id}/maintenance",
    tag = "Robots",
    summary = "Toggle maintenance",
    request_body = MaintenanceRequest,
    params(
        ("id" = RobotId, Path, description = "Robot UUID"),
    ),
    responses(
        (status = 200, description = "Resulting status", body = RobotStatusResponse),
        (status = 409, description = "Robot is in use", body = ErrorResponse),
    )
)]
pub async fn set_maintenance(
    State(state): State<AppState>,
    operator: Operator,
    Path(id): Path<RobotId>,
    Json(req): Json<MaintenanceRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let status = state
        .authority
        .set_maintenance(id, operator, req.enabled)
        .await?;
    Ok(Json(RobotStatusResponse {
        robot_id: id,
        status,
        timestamp: Utc::now(),
    }))
}

/// Robot record routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/robots", post(register_robot).get(list_robots))
        .route("/robots/{id}", get(get_robot).delete(retire_robot))
        .route("/robots/{id}/access", put(grant_access))
        .route("/robots/{id}/access/{user_id}", delete(revoke_access))
        .route("/robots/{id}/clear-fault", post(clear_fault))
        .route("/robots/{id}/maintenance", put(set_maintenance))
}
