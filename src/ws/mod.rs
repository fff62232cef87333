//! WebSocket layer: connection handling, message routing, subscriptions.
//!
//! The WebSocket endpoint at `/ws` streams robot events filtered by robot
//! and topic, and accepts session and command requests from the
//! authenticated operator.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod subscription;
