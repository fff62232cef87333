//! Operator commands and the protocol-neutral velocity vector.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Three-component vector. Missing axes deserialize as `0.0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Vector3 {
    /// X component.
    #[serde(default)]
    pub x: f64,
    /// Y component.
    #[serde(default)]
    pub y: f64,
    /// Z component.
    #[serde(default)]
    pub z: f64,
}

impl Vector3 {
    /// The all-zero vector.
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    /// Creates a vector from its components.
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Protocol-neutral velocity command (a ROS `Twist` in spirit).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct VelocityVector {
    /// Linear velocity.
    #[serde(default)]
    pub linear: Vector3,
    /// Angular velocity.
    #[serde(default)]
    pub angular: Vector3,
}

impl VelocityVector {
    /// Stop-in-place: every component zero.
    pub const ZERO: Self = Self {
        linear: Vector3::ZERO,
        angular: Vector3::ZERO,
    };

    /// Returns `true` when every component is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

/// Normalized hand position reported by the gesture recognizer.
///
/// `x` and `y` are in image space, `0.0..=1.0`, with `(0.5, 0.5)` the
/// frame center and `y` growing downwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HandPosition {
    /// Horizontal position.
    #[serde(default)]
    pub x: f64,
    /// Vertical position.
    #[serde(default)]
    pub y: f64,
    /// Depth estimate.
    #[serde(default)]
    pub z: f64,
}

/// Gesture classification produced by the recognition collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GestureType {
    /// Open palm: steer by hand position.
    Open,
    /// Pinch: spin in place.
    Pinch,
    /// Closed fist: stop.
    Fist,
    /// Pointing finger: creep forward.
    Point,
    /// Anything the recognizer reports that is not mapped to motion.
    #[serde(other)]
    Unknown,
}

/// How the session holder intends to drive the robot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ControlMode {
    /// Direct velocity input.
    #[default]
    Manual,
    /// Camera gesture input.
    Gesture,
    /// Robot drives itself; the holder supervises.
    Autonomous,
    /// Program upload / teach mode.
    Programming,
}

impl ControlMode {
    /// Returns the mode as a static string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Gesture => "gesture",
            Self::Autonomous => "autonomous",
            Self::Programming => "programming",
        }
    }
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// High-level operator input, before translation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandKind {
    /// Direct velocity input; missing axes default to zero.
    Manual {
        /// Requested linear velocity.
        #[serde(default)]
        linear: Vector3,
        /// Requested angular velocity.
        #[serde(default)]
        angular: Vector3,
    },
    /// Classified gesture from the recognition collaborator.
    Gesture {
        /// Gesture class.
        gesture_type: GestureType,
        /// Hand position in normalized image space.
        #[serde(default)]
        hand_position: HandPosition,
        /// Classifier confidence, `0.0..=1.0`.
        #[serde(default)]
        confidence: f64,
    },
    /// Stop in place.
    Stop,
    /// Stop and fault the robot.
    EmergencyStop,
}

impl CommandKind {
    /// Returns the command type as a static string slice.
    #[must_use]
    pub const fn type_str(&self) -> &'static str {
        match self {
            Self::Manual { .. } => "manual",
            Self::Gesture { .. } => "gesture",
            Self::Stop => "stop",
            Self::EmergencyStop => "emergency_stop",
        }
    }

    /// Returns `true` for [`CommandKind::EmergencyStop`].
    #[must_use]
    pub const fn is_emergency_stop(&self) -> bool {
        matches!(self, Self::EmergencyStop)
    }
}

/// An issued command: immutable, timestamped at creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Command {
    /// What was requested.
    #[serde(flatten)]
    kind: CommandKind,
    /// When the command was issued.
    issued_at: DateTime<Utc>,
}

impl Command {
    /// Issues a command stamped with the current time.
    #[must_use]
    pub fn new(kind: CommandKind) -> Self {
        Self::issued_at(kind, Utc::now())
    }

    /// Issues a command with an explicit timestamp.
    #[must_use]
    pub const fn issued_at(kind: CommandKind, issued_at: DateTime<Utc>) -> Self {
        Self { kind, issued_at }
    }

    /// Issues a [`CommandKind::Stop`].
    #[must_use]
    pub fn stop() -> Self {
        Self::new(CommandKind::Stop)
    }

    /// Issues a [`CommandKind::EmergencyStop`].
    #[must_use]
    pub fn emergency_stop() -> Self {
        Self::new(CommandKind::EmergencyStop)
    }

    /// Returns the command payload.
    #[must_use]
    pub const fn kind(&self) -> &CommandKind {
        &self.kind
    }

    /// Returns the issue timestamp.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.issued_at
    }
}
