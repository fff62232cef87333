//! Events emitted by the control plane.
//!
//! Every session transition, status change, telemetry sample, and
//! acknowledged command becomes a [`RobotEvent`] on the
//! [`super::EventBus`], where every observer of the robot (not only the
//! controller) can pick it up.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::command::{Command, ControlMode, VelocityVector};
use super::communication::ProtocolKind;
use super::robot::RobotStatus;
use super::{RobotId, UserId};

/// Why a control session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEndReason {
    /// The holder called end-session.
    Released,
    /// The holder's transport closed.
    ControllerDisconnected,
    /// An emergency stop cleared the session.
    EmergencyStop,
}

/// Subscription topic an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventTopic {
    /// Status, heartbeat, and connection changes.
    Status,
    /// Telemetry samples.
    Telemetry,
    /// Session lifecycle.
    Session,
    /// Command acknowledgements.
    Command,
}

impl EventTopic {
    /// All topics.
    pub const ALL: [Self; 4] = [Self::Status, Self::Telemetry, Self::Session, Self::Command];

    /// Returns the topic as a static string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Telemetry => "telemetry",
            Self::Session => "session",
            Self::Command => "command",
        }
    }
}

impl fmt::Display for EventTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventTopic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown topic: {s}"))
    }
}

/// Domain event broadcast after every control-plane mutation or inbound
/// robot message.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum RobotEvent {
    /// A control session was granted.
    SessionStarted {
        /// Robot identifier.
        robot_id: RobotId,
        /// New holder.
        controller_id: UserId,
        /// Driving mode.
        mode: ControlMode,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A control session ended.
    SessionEnded {
        /// Robot identifier.
        robot_id: RobotId,
        /// Former holder.
        controller_id: UserId,
        /// Why the session ended.
        reason: SessionEndReason,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Robot status changed.
    StatusChanged {
        /// Robot identifier.
        robot_id: RobotId,
        /// New status.
        status: RobotStatus,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Telemetry sample from the robot.
    Telemetry {
        /// Robot identifier.
        robot_id: RobotId,
        /// Protocol-neutral payload.
        payload: serde_json::Value,
        /// When the sample was received.
        timestamp: DateTime<Utc>,
    },

    /// Liveness signal from the robot.
    Heartbeat {
        /// Robot identifier.
        robot_id: RobotId,
        /// When the heartbeat was received.
        timestamp: DateTime<Utc>,
    },

    /// A command reached the robot's adapter.
    CommandAcknowledged {
        /// Robot identifier.
        robot_id: RobotId,
        /// Issuing holder.
        controller_id: UserId,
        /// Command as issued.
        command: Command,
        /// Velocity forwarded to the adapter.
        velocity: VelocityVector,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },

    /// A protocol connection was opened or closed.
    ConnectionChanged {
        /// Robot identifier.
        robot_id: RobotId,
        /// `true` after connect, `false` after disconnect.
        connected: bool,
        /// Protocol of the connection.
        protocol: ProtocolKind,
        /// Event timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl RobotEvent {
    /// Returns the robot ID associated with this event.
    #[must_use]
    pub fn robot_id(&self) -> RobotId {
        match self {
            Self::SessionStarted { robot_id, .. }
            | Self::SessionEnded { robot_id, .. }
            | Self::StatusChanged { robot_id, .. }
            | Self::Telemetry { robot_id, .. }
            | Self::Heartbeat { robot_id, .. }
            | Self::CommandAcknowledged { robot_id, .. }
            | Self::ConnectionChanged { robot_id, .. } => *robot_id,
        }
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::SessionStarted { .. } => "session_started",
            Self::SessionEnded { .. } => "session_ended",
            Self::StatusChanged { .. } => "status_changed",
            Self::Telemetry { .. } => "telemetry",
            Self::Heartbeat { .. } => "heartbeat",
            Self::CommandAcknowledged { .. } => "command_acknowledged",
            Self::ConnectionChanged { .. } => "connection_changed",
        }
    }

    /// Returns the subscription topic of this event.
    #[must_use]
    pub const fn topic(&self) -> EventTopic {
        match self {
            Self::SessionStarted { .. } | Self::SessionEnded { .. } => EventTopic::Session,
            Self::StatusChanged { .. }
            | Self::Heartbeat { .. }
            | Self::ConnectionChanged { .. } => EventTopic::Status,
            Self::Telemetry { .. } => EventTopic::Telemetry,
            Self::CommandAcknowledged { .. } => EventTopic::Command,
        }
    }
}
