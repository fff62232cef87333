//! Robot aggregate: status, communication, permissions, session mirror,
//! and cached telemetry.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::access::{self, AccessLevel, AccessList};
use super::command::ControlMode;
use super::communication::CommunicationConfig;
use super::{RobotId, UserId};

/// Operational status of a robot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RobotStatus {
    /// Not reachable.
    #[default]
    Offline,
    /// Reachable and ready.
    Online,
    /// Taken out of service by an operator.
    Maintenance,
    /// Faulted (e.g. after an emergency stop); cleared only by an admin.
    Error,
    /// Docked and charging.
    Charging,
}

impl RobotStatus {
    /// Returns the status as a static string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Online => "online",
            Self::Maintenance => "maintenance",
            Self::Error => "error",
            Self::Charging => "charging",
        }
    }

    /// Returns `true` for statuses only an operator may leave
    /// (`error`, `maintenance`).
    #[must_use]
    pub const fn is_operator_held(&self) -> bool {
        matches!(self, Self::Error | Self::Maintenance)
    }
}

impl fmt::Display for RobotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RobotStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "offline" => Ok(Self::Offline),
            "online" => Ok(Self::Online),
            "maintenance" => Ok(Self::Maintenance),
            "error" => Ok(Self::Error),
            "charging" => Ok(Self::Charging),
            other => Err(format!("unknown robot status: {other}")),
        }
    }
}

/// The exclusive control lock one user holds over one robot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ControlSession {
    /// Controlled robot.
    pub robot_id: RobotId,
    /// Current holder.
    pub controller_id: UserId,
    /// When the session started.
    pub started_at: DateTime<Utc>,
    /// Driving mode.
    pub mode: ControlMode,
    /// Robot model (URDF) reference supplied at start, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urdf_ref: Option<String>,
}

/// Session state machine position of a robot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    /// No session; a start request may succeed.
    Available,
    /// Held exclusively by `session.controller_id`.
    Held {
        /// The active session.
        session: ControlSession,
    },
    /// Faulted after an emergency stop; cleared by an admin.
    Faulted,
}

/// Latest telemetry received from the robot.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TelemetrySnapshot {
    /// Raw protocol-neutral payload.
    #[schema(value_type = Object)]
    pub payload: serde_json::Value,
    /// When the gateway received it.
    pub received_at: DateTime<Utc>,
}

/// Robot descriptor as read from the persistence collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RobotDescriptor {
    /// Identity; generated when absent.
    #[serde(default)]
    pub id: Option<RobotId>,
    /// Display name.
    pub name: String,
    /// Owning user (implicit admin).
    pub owner: UserId,
    /// How to reach the robot.
    pub communication: CommunicationConfig,
    /// Explicit grants.
    #[serde(default)]
    pub access_permissions: AccessList,
    /// Initial status.
    #[serde(default)]
    pub status: RobotStatus,
}

/// Robot aggregate held in the [`super::RobotRegistry`].
#[derive(Debug, Clone)]
pub struct Robot {
    /// Identity.
    pub id: RobotId,
    /// Display name.
    pub name: String,
    /// Owning user.
    pub owner: UserId,
    /// Operational status.
    pub status: RobotStatus,
    /// How to reach the robot.
    pub communication: CommunicationConfig,
    /// Explicit grants.
    pub access_permissions: AccessList,
    /// Mirror of the authoritative session.
    pub current_session: Option<ControlSession>,
    /// Latest telemetry.
    pub telemetry: Option<TelemetrySnapshot>,
    /// Last heartbeat received.
    pub last_heartbeat: Option<DateTime<Utc>>,
    /// Soft-retired robots refuse sessions and are hidden from lists.
    pub retired: bool,
    /// Registration timestamp.
    pub registered_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub last_modified_at: DateTime<Utc>,
}

impl Robot {
    /// Builds a robot from its descriptor, generating an id when missing.
    #[must_use]
    pub fn from_descriptor(descriptor: RobotDescriptor) -> Self {
        let now = Utc::now();
        Self {
            id: descriptor.id.unwrap_or_default(),
            name: descriptor.name,
            owner: descriptor.owner,
            status: descriptor.status,
            communication: descriptor.communication,
            access_permissions: descriptor.access_permissions,
            current_session: None,
            telemetry: None,
            last_heartbeat: None,
            retired: false,
            registered_at: now,
            last_modified_at: now,
        }
    }

    /// Returns the level `user_id` holds on this robot.
    #[must_use]
    pub fn granted_level(&self, user_id: UserId) -> Option<AccessLevel> {
        access::granted_level(self.owner, &self.access_permissions, user_id)
    }

    /// Returns `true` when `user_id` holds at least `required`.
    #[must_use]
    pub fn authorize(&self, user_id: UserId, required: AccessLevel) -> bool {
        access::authorize(self.owner, &self.access_permissions, user_id, required)
    }

    /// Derives the session state machine position.
    #[must_use]
    pub fn session_state(&self) -> SessionState {
        if self.status == RobotStatus::Error {
            return SessionState::Faulted;
        }
        match &self.current_session {
            Some(session) => SessionState::Held {
                session: session.clone(),
            },
            None => SessionState::Available,
        }
    }

    /// Returns the reason a new session cannot start, or `None` if the
    /// robot is available.
    #[must_use]
    pub fn unavailability(&self) -> Option<String> {
        if self.retired {
            return Some("robot is retired".to_string());
        }
        match self.status {
            RobotStatus::Error => return Some("robot is faulted".to_string()),
            RobotStatus::Maintenance => return Some("robot is in maintenance".to_string()),
            _ => {}
        }
        self.current_session
            .as_ref()
            .map(|s| format!("robot is controlled by {}", s.controller_id))
    }

    /// Returns `true` when `user_id` holds the current session.
    #[must_use]
    pub fn is_held_by(&self, user_id: UserId) -> bool {
        self.current_session
            .as_ref()
            .is_some_and(|s| s.controller_id == user_id)
    }

    /// Returns the current session holder, if any.
    #[must_use]
    pub fn holder(&self) -> Option<UserId> {
        self.current_session.as_ref().map(|s| s.controller_id)
    }

    /// Sets the status, returning `true` if it changed.
    pub fn set_status(&mut self, status: RobotStatus) -> bool {
        if self.status == status {
            return false;
        }
        self.status = status;
        self.touch();
        true
    }

    /// Applies a status reported by the robot itself.
    ///
    /// Robot reports never override `error` or `maintenance`. Returns `true`
    /// if the status changed.
    pub fn apply_reported_status(&mut self, status: RobotStatus) -> bool {
        if self.status.is_operator_held() {
            return false;
        }
        self.set_status(status)
    }

    /// Caches the latest telemetry payload.
    pub fn record_telemetry(&mut self, payload: serde_json::Value, received_at: DateTime<Utc>) {
        self.telemetry = Some(TelemetrySnapshot {
            payload,
            received_at,
        });
        self.touch();
    }

    /// Records a heartbeat.
    pub fn record_heartbeat(&mut self, at: DateTime<Utc>) {
        self.last_heartbeat = Some(at);
    }

    fn touch(&mut self) {
        self.last_modified_at = Utc::now();
    }
}

/// Lightweight summary of a robot for list endpoints.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RobotSummary {
    /// Robot identifier.
    pub robot_id: RobotId,
    /// Display name.
    pub name: String,
    /// Owning user.
    pub owner: UserId,
    /// Operational status.
    pub status: RobotStatus,
    /// Wire protocol.
    pub protocol: super::ProtocolKind,
    /// Current holder, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller_id: Option<UserId>,
    /// Registration timestamp.
    pub registered_at: DateTime<Utc>,
}

impl From<&Robot> for RobotSummary {
    fn from(robot: &Robot) -> Self {
        Self {
            robot_id: robot.id,
            name: robot.name.clone(),
            owner: robot.owner,
            status: robot.status,
            protocol: robot.communication.protocol,
            controller_id: robot.holder(),
            registered_at: robot.registered_at,
        }
    }
}
