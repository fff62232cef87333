//! Service layer: session authority and connection management.
//!
//! [`SessionAuthority`] owns every session transition and drives the
//! [`ConnectionRegistry`], which in turn owns one link per robot. Events
//! are emitted through the [`super::domain::EventBus`].

pub mod connection_registry;
pub mod fleet;
pub mod session_authority;

pub use connection_registry::{ConnectionRegistry, ConnectionStatus};
pub use fleet::{FleetStopReport, RobotStopResult};
pub use session_authority::{
    CommandReceipt, ConnectOutcome, RobotView, SessionAuthority, SessionGrant,
};
