//! Gateway error types with HTTP status code mapping.
//!
//! [`GatewayError`] is the central error type for the control plane. Each
//! variant maps to a stable numeric code and an HTTP status, so clients can
//! tell "someone else is driving this robot" ([`GatewayError::NotHolder`])
//! apart from "you lack permission" ([`GatewayError::AccessDenied`]).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{ProtocolKind, RobotId, UserId};

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2102,
///     "message": "robot 5f0c... is controlled by another user",
///     "details": "holder=9a41..."
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Control-plane error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category                 | HTTP Status                   |
/// |-----------|--------------------------|-------------------------------|
/// | 1000–1999 | Validation / identity    | 400 / 401                     |
/// | 2000–2999 | Robot, session, registry | 404 Not Found / 409 Conflict  |
/// | 3000–3999 | Server                   | 500 Internal Server Error     |
/// | 4000–4999 | Authorization            | 403 Forbidden                 |
/// | 5000–5999 | Transport                | 502 / 503 / 504               |
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No usable identity on the request.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Robot with the given ID is not registered.
    #[error("robot not found: {0}")]
    RobotNotFound(RobotId),

    /// Session start lost a race or the robot is not eligible.
    #[error("robot {robot_id} is not available: {reason}")]
    NotAvailable {
        /// Target robot.
        robot_id: RobotId,
        /// Why the robot cannot take a new session.
        reason: String,
    },

    /// Caller is not the current session holder.
    #[error("caller does not hold the control session of robot {robot_id}")]
    NotHolder {
        /// Target robot.
        robot_id: RobotId,
        /// Current holder, or `None` when no session exists.
        holder: Option<UserId>,
    },

    /// A connection already exists for this robot.
    #[error("robot {0} is already connected")]
    AlreadyConnected(RobotId),

    /// No connection exists for this robot.
    #[error("robot {0} is not connected")]
    NotConnected(RobotId),

    /// Access control rejected the caller.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Adapter kind was not initialized at startup.
    #[error("protocol {protocol} is unavailable: {reason}")]
    ProtocolUnavailable {
        /// Disabled protocol kind.
        protocol: ProtocolKind,
        /// Why the adapter is disabled.
        reason: String,
    },

    /// Adapter could not reach the robot.
    #[error("connect via {protocol} failed: {reason}")]
    ConnectFailed {
        /// Protocol used.
        protocol: ProtocolKind,
        /// Underlying failure.
        reason: String,
    },

    /// Transport refused or dropped a command.
    #[error("send failed: {0}")]
    SendFailure(String),

    /// A bounded network operation did not complete in time.
    #[error("{operation} timed out after {after_ms} ms")]
    Timeout {
        /// Operation that timed out (`connect`, `send`, `disconnect`).
        operation: &'static str,
        /// Configured bound.
        after_ms: u64,
    },

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::Unauthenticated(_) => 1003,
            Self::RobotNotFound(_) => 2001,
            Self::NotAvailable { .. } => 2101,
            Self::NotHolder { .. } => 2102,
            Self::AlreadyConnected(_) => 2201,
            Self::NotConnected(_) => 2202,
            Self::Internal(_) => 3000,
            Self::AccessDenied(_) => 4003,
            Self::ProtocolUnavailable { .. } => 5001,
            Self::ConnectFailed { .. } => 5002,
            Self::SendFailure(_) => 5003,
            Self::Timeout { .. } => 5004,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::RobotNotFound(_) => StatusCode::NOT_FOUND,
            Self::NotAvailable { .. }
            | Self::NotHolder { .. }
            | Self::AlreadyConnected(_)
            | Self::NotConnected(_) => StatusCode::CONFLICT,
            Self::AccessDenied(_) => StatusCode::FORBIDDEN,
            Self::ProtocolUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::ConnectFailed { .. } | Self::SendFailure(_) => StatusCode::BAD_GATEWAY,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns extra machine-readable context, if any.
    #[must_use]
    pub fn details(&self) -> Option<String> {
        match self {
            Self::NotHolder {
                holder: Some(holder),
                ..
            } => Some(format!("holder={holder}")),
            Self::NotHolder { holder: None, .. } => Some("no active session".to_string()),
            _ => None,
        }
    }

    /// Returns `true` for transient transport faults.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::SendFailure(_) | Self::Timeout { .. })
    }

    /// Converts the error into its serializable body.
    #[must_use]
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.error_code(),
            message: self.to_string(),
            details: self.details(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.to_body(),
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
