//! Session, command, and connection DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{CommandKind, ControlMode, RobotId, UserId};

/// Request body for `POST /robots/{id}/session`.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct StartSessionRequest {
    /// Control mode. Defaults to `manual`.
    #[serde(default)]
    pub mode: ControlMode,
    /// Robot model reference passed through to clients.
    #[serde(default)]
    pub urdf_ref: Option<String>,
}

/// Request body for `POST /robots/{id}/commands`.
///
/// `command` is tagged by `type`: `manual` (`linear`, `angular`), `gesture`
/// (`gesture_type`, `hand_position`, `confidence`), `stop`, or
/// `emergency_stop`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SendCommandRequest {
    /// The command to forward.
    #[schema(value_type = Object)]
    pub command: CommandKind,
}

/// Response body for `DELETE /robots/{id}/connection`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DisconnectResponse {
    /// Robot identifier.
    pub robot_id: RobotId,
    /// Whether a live link was closed.
    pub disconnected: bool,
}

/// Response body for `POST /robots/{id}/emergency-stop`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EmergencyStopResponse {
    /// Robot identifier.
    pub robot_id: RobotId,
    /// Who issued the stop.
    pub executed_by: UserId,
    /// When the stop completed.
    pub timestamp: DateTime<Utc>,
}
