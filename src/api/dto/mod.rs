//! Data Transfer Objects for REST request/response serialization.
//!
//! Service-layer results that are already wire-shaped (`SessionGrant`,
//! `CommandReceipt`, `RobotView`, `FleetStopReport`) are returned as is.

pub mod common_dto;
pub mod robot_dto;
pub mod session_dto;

pub use common_dto::*;
pub use robot_dto::*;
pub use session_dto::*;
