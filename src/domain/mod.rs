//! Domain layer: robots, access control, commands, and the event system.
//!
//! This module contains the server-side domain model: identifiers, the
//! robot aggregate and its registry, per-robot access control, operator
//! commands with their velocity translation, and the event bus that fans
//! robot events out to observers.

pub mod access;
pub mod command;
pub mod communication;
pub mod event_bus;
pub mod ids;
pub mod robot;
pub mod robot_event;
pub mod robot_registry;
pub mod translator;

pub use access::{AccessLevel, AccessList, AccessPermission, Operator, OperatorRole};
pub use command::{
    Command, CommandKind, ControlMode, GestureType, HandPosition, Vector3, VelocityVector,
};
pub use communication::{CommunicationConfig, ProtocolKind, ResolvedTopics, TopicNames};
pub use event_bus::{EventBus, RobotSubscription};
pub use ids::{RobotId, UserId};
pub use robot::{
    ControlSession, Robot, RobotDescriptor, RobotStatus, RobotSummary, SessionState,
    TelemetrySnapshot,
};
pub use robot_event::{EventTopic, RobotEvent, SessionEndReason};
pub use robot_registry::RobotRegistry;
