//! Raw JSON-over-WebSocket adapter.
//!
//! Outbound frames:
//! - `{"type":"command","data":{"linear":{..},"angular":{..}},"timestamp":".."}`
//! - `{"type":"subscribe","topics":["status","heartbeat"]}`
//! - `{"type":"unsubscribe","topics":[..]}`
//!
//! Inbound frames carry `{"type":"status"|"telemetry"|"heartbeat","data":..}`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use tokio::sync::Mutex;

use super::ws_link::WsLink;
use super::{InboundKind, InboundMessage, InboundSink, ProtocolAdapter, RobotLink};
use crate::domain::{CommunicationConfig, ProtocolKind, ResolvedTopics, RobotId, VelocityVector};
use crate::error::GatewayError;

/// Builds the outbound command frame.
#[must_use]
pub fn command_frame(velocity: &VelocityVector) -> Value {
    json!({
        "type": "command",
        "data": velocity,
        "timestamp": Utc::now(),
    })
}

fn topics_frame(kind: &str, topics: &[String]) -> Value {
    json!({"type": kind, "topics": topics})
}

/// Decodes an inbound frame. Frames of other types are ignored.
#[must_use]
pub fn decode_frame(robot_id: RobotId, topics: &ResolvedTopics, text: &str) -> Option<InboundMessage> {
    let frame: Value = serde_json::from_str(text).ok()?;
    let kind = match frame.get("type").and_then(Value::as_str)? {
        "status" => InboundKind::Status,
        "telemetry" => InboundKind::Telemetry,
        "heartbeat" => InboundKind::Heartbeat,
        other => InboundKind::for_topic(topics, other)?,
    };
    let payload = frame.get("data").cloned().unwrap_or(Value::Null);
    Some(InboundMessage::new(robot_id, kind, payload))
}

#[derive(Debug)]
struct WebSocketLink {
    ws: WsLink,
    topics: ResolvedTopics,
    subscribed: Mutex<Vec<String>>,
}

impl WebSocketLink {
    async fn add_topics(&self, names: &[&str]) -> Result<(), GatewayError> {
        let mut subscribed = self.subscribed.lock().await;
        let fresh: Vec<String> = names
            .iter()
            .filter(|n| !subscribed.iter().any(|s| s == *n))
            .map(|n| (*n).to_string())
            .collect();
        if fresh.is_empty() {
            return Ok(());
        }
        self.ws.send_json(&topics_frame("subscribe", &fresh)).await?;
        subscribed.extend(fresh);
        Ok(())
    }
}

#[async_trait]
impl RobotLink for WebSocketLink {
    async fn publish_command(&self, velocity: &VelocityVector) -> Result<(), GatewayError> {
        self.ws.send_json(&command_frame(velocity)).await
    }

    async fn subscribe_status(&self) -> Result<(), GatewayError> {
        self.add_topics(&[self.topics.status.as_str(), self.topics.heartbeat.as_str()])
            .await
    }

    async fn subscribe_telemetry(&self) -> Result<(), GatewayError> {
        self.add_topics(&[self.topics.telemetry.as_str()]).await
    }

    fn is_alive(&self) -> bool {
        self.ws.is_alive()
    }

    async fn disconnect(&self) -> Result<(), GatewayError> {
        let topics: Vec<String> = self.subscribed.lock().await.drain(..).collect();
        if !topics.is_empty()
            && self.ws.is_alive()
            && let Err(e) = self.ws.send_json(&topics_frame("unsubscribe", &topics)).await
        {
            tracing::debug!(error = %e, "websocket unsubscribe failed");
        }
        self.ws.close().await;
        Ok(())
    }
}

/// Adapter for robots exposing a plain JSON WebSocket endpoint.
#[derive(Debug, Clone)]
pub struct WebSocketAdapter {
    keepalive: Duration,
}

impl WebSocketAdapter {
    /// Creates the adapter with the given keep-alive interval.
    #[must_use]
    pub const fn new(keepalive: Duration) -> Self {
        Self { keepalive }
    }
}

#[async_trait]
impl ProtocolAdapter for WebSocketAdapter {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Websocket
    }

    async fn connect(
        &self,
        robot_id: RobotId,
        communication: &CommunicationConfig,
        inbound: InboundSink,
    ) -> Result<Box<dyn RobotLink>, GatewayError> {
        let url = communication.ws_url();
        let topics = communication.topics_for(&robot_id.to_string());
        let decode_topics = topics.clone();
        let ws = WsLink::open(&url, self.keepalive, inbound, move |text| {
            decode_frame(robot_id, &decode_topics, text)
        })
        .await
        .map_err(|reason| GatewayError::ConnectFailed {
            protocol: ProtocolKind::Websocket,
            reason,
        })?;
        tracing::debug!(%robot_id, url = %url, "websocket link open");

        Ok(Box::new(WebSocketLink {
            ws,
            topics,
            subscribed: Mutex::new(Vec::new()),
        }))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::Vector3;

    fn topics() -> ResolvedTopics {
        CommunicationConfig::new(ProtocolKind::Websocket, "h").topics_for("r1")
    }

    #[test]
    fn command_frame_carries_velocity() {
        let v = VelocityVector {
            linear: Vector3::new(0.3, 0.0, 0.0),
            angular: Vector3::ZERO,
        };
        let frame = command_frame(&v);
        assert_eq!(frame.get("type").and_then(Value::as_str), Some("command"));
        let x = frame
            .get("data")
            .and_then(|d| d.get("linear"))
            .and_then(|l| l.get("x"))
            .and_then(Value::as_f64);
        assert_eq!(x, Some(0.3));
        assert!(frame.get("timestamp").is_some());
    }

    #[test]
    fn decode_status_and_telemetry() {
        let id = RobotId::new();
        let Some(status) = decode_frame(id, &topics(), r#"{"type":"status","data":"online"}"#)
        else {
            panic!("expected status");
        };
        assert_eq!(status.message_type, InboundKind::Status);
        assert_eq!(status.payload, json!("online"));

        let Some(telemetry) =
            decode_frame(id, &topics(), r#"{"type":"telemetry","data":{"battery":12}}"#)
        else {
            panic!("expected telemetry");
        };
        assert_eq!(telemetry.message_type, InboundKind::Telemetry);
    }

    #[test]
    fn decode_ignores_unknown_types() {
        assert!(decode_frame(RobotId::new(), &topics(), r#"{"type":"log","data":"x"}"#).is_none());
        assert!(decode_frame(RobotId::new(), &topics(), "[]").is_none());
    }
}
