//! Axum WebSocket upgrade handler.

use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::IntoResponse;

use super::connection::run_connection;
use crate::app_state::AppState;
use crate::domain::Operator;

/// `GET /ws`: Upgrade an authenticated HTTP connection to WebSocket.
///
/// The caller's identity is read from the upgrade request headers and
/// stays fixed for the socket's lifetime.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    operator: Operator,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let event_rx = state.event_bus.subscribe();
    let authority = std::sync::Arc::clone(&state.authority);

    ws.on_upgrade(move |socket| run_connection(socket, operator, authority, event_rx))
}
