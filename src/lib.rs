//! # teleop-gateway
//!
//! Robot communication and exclusive control-session gateway for
//! heterogeneous robot fleets.
//!
//! The gateway keeps at most one live link per robot over ROS 2,
//! ROS-bridge, MQTT, or raw WebSocket, grants one operator at a time the
//! exclusive right to drive a robot, translates manual and gesture input
//! into velocity commands, and fans robot status and telemetry out to
//! subscribers.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)
//!     │
//!     ├── REST Handlers (api/)
//!     ├── WS Handler (ws/)
//!     │
//!     ├── SessionAuthority (service/)
//!     ├── ConnectionRegistry (service/)
//!     ├── EventBus (domain/)
//!     │
//!     ├── RobotRegistry + CommandTranslator (domain/)
//!     │
//!     └── Protocol adapters (protocol/): ROS 2, ROS-bridge, MQTT, WebSocket
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod protocol;
pub mod service;
pub mod ws;

use std::time::Duration;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

/// Builds the full HTTP + WebSocket application. REST requests are
/// bounded by `request_timeout`; upgraded sockets are not.
pub fn build_app(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .merge(api::build_router())
        .layer(TimeoutLayer::new(request_timeout))
        .route("/ws", get(ws::handler::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
