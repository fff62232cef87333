//! REST endpoint handlers organized by resource.

pub mod connection;
pub mod emergency;
pub mod robot;
pub mod session;
pub mod system;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(robot::routes())
        .merge(session::routes())
        .merge(connection::routes())
        .merge(emergency::routes())
}
