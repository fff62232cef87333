//! WebSocket connection state machine.
//!
//! Handles the read/write loop for a single WebSocket connection,
//! dispatching incoming commands and forwarding filtered events. Sessions
//! started through the socket are released when it closes.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::broadcast;

use super::messages::{WsCommand, WsMessage, WsMessageType, parse_robot_ids};
use super::subscription::SubscriptionManager;
use crate::domain::{Operator, RobotEvent, RobotId};
use crate::error::GatewayError;
use crate::service::SessionAuthority;

/// Runs the read/write loop for a single WebSocket connection.
///
/// - Reads commands from the client and dispatches them.
/// - Forwards matching events from the [`broadcast::Receiver`] to the client.
/// - On close, ends every session this socket started.
pub async fn run_connection(
    socket: WebSocket,
    operator: Operator,
    authority: Arc<SessionAuthority>,
    mut event_rx: broadcast::Receiver<RobotEvent>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut client = ClientContext::new(operator, authority);
    tracing::debug!(user_id = %operator.user_id, "ws connection opened");

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let response = client.handle_text_message(text.as_str()).await;
                        if let Some(resp_json) = response
                            && ws_tx.send(Message::text(resp_json)).await.is_err() {
                                break;
                            }
                    }
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    _ => {}
                }
            }
            event = event_rx.recv() => {
                match event {
                    Ok(robot_event) => {
                        if client.subs.matches(&robot_event) {
                            let msg = WsMessage::event(serde_json::to_value(&robot_event).unwrap_or_default());
                            let json = serde_json::to_string(&msg).unwrap_or_default();
                            if ws_tx.send(Message::text(json)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(user_id = %operator.user_id, lagged = n, "ws client lagged behind event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    client.release_sessions().await;
    tracing::debug!(user_id = %operator.user_id, "ws connection closed");
}

/// Per-socket state: identity, subscriptions, and sessions started here.
#[derive(Debug)]
struct ClientContext {
    operator: Operator,
    authority: Arc<SessionAuthority>,
    subs: SubscriptionManager,
    sessions: HashSet<RobotId>,
}

impl ClientContext {
    fn new(operator: Operator, authority: Arc<SessionAuthority>) -> Self {
        Self {
            operator,
            authority,
            subs: SubscriptionManager::new(),
            sessions: HashSet::new(),
        }
    }

    /// Handles a text frame, returning the JSON reply.
    async fn handle_text_message(&mut self, text: &str) -> Option<String> {
        let Ok(msg) = serde_json::from_str::<WsMessage>(text) else {
            let err = GatewayError::InvalidRequest("malformed JSON".to_string());
            return encode(&WsMessage::error(String::new(), &err));
        };
        if msg.msg_type != WsMessageType::Command {
            let err = GatewayError::InvalidRequest("expected a command message".to_string());
            return encode(&WsMessage::error(msg.id, &err));
        }

        let reply = match serde_json::from_value::<WsCommand>(msg.payload) {
            Ok(command) => match self.dispatch(command).await {
                Ok(payload) => WsMessage::response(msg.id, payload),
                Err(e) => WsMessage::error(msg.id, &e),
            },
            Err(e) => WsMessage::error(
                msg.id,
                &GatewayError::InvalidRequest(format!("unknown command: {e}")),
            ),
        };
        encode(&reply)
    }

    async fn dispatch(&mut self, command: WsCommand) -> Result<Value, GatewayError> {
        let user_id = self.operator.user_id;
        match command {
            WsCommand::Subscribe { robot_ids, topics } => {
                let (ids, wildcard) = parse_robot_ids(&robot_ids);
                self.subs.subscribe(&ids, wildcard, &topics);
                Ok(json!({
                    "subscribed": ids.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "count": self.subs.count(),
                    "wildcard": self.subs.is_subscribed_all(),
                    "topics": self.subs.topics(),
                }))
            }
            WsCommand::Unsubscribe { robot_ids } => {
                let (ids, wildcard) = parse_robot_ids(&robot_ids);
                self.subs.unsubscribe(&ids, wildcard);
                Ok(json!({
                    "unsubscribed": ids.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "remaining_count": self.subs.count(),
                }))
            }
            WsCommand::StartSession {
                robot_id,
                mode,
                urdf_ref,
            } => {
                let grant = self
                    .authority
                    .start_session(robot_id, user_id, mode, urdf_ref)
                    .await?;
                self.sessions.insert(robot_id);
                to_payload(&grant)
            }
            WsCommand::SendCommand { robot_id, data } => {
                let receipt = self.authority.send_command(robot_id, user_id, data).await?;
                to_payload(&receipt)
            }
            WsCommand::EndSession { robot_id } => {
                let session = self.authority.end_session(robot_id, user_id).await?;
                self.sessions.remove(&robot_id);
                to_payload(&session)
            }
            WsCommand::ConnectionStatus { robot_id } => {
                let status = self.authority.connection_status(robot_id, user_id).await?;
                to_payload(&status)
            }
        }
    }

    async fn release_sessions(&mut self) {
        for robot_id in self.sessions.drain() {
            if self
                .authority
                .release_on_disconnect(robot_id, self.operator.user_id)
                .await
                .is_some()
            {
                tracing::info!(%robot_id, user_id = %self.operator.user_id, "session released on socket close");
            }
        }
    }
}

fn encode(msg: &WsMessage) -> Option<String> {
    serde_json::to_string(msg).ok()
}

fn to_payload<T: Serialize>(value: &T) -> Result<Value, GatewayError> {
    serde_json::to_value(value).map_err(|e| GatewayError::Internal(e.to_string()))
}
