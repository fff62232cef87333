//! ROS adapters speaking the rosbridge JSON protocol.
//!
//! Both the legacy ROS bridge and the ROS 2 bus node are reached through a
//! `rosbridge_server`-compatible WebSocket. They differ in the endpoint
//! (per-robot bridge vs. the shared bus node) and in message type names:
//!
//! | Dialect | Twist type | String type |
//! |---------|------------|-------------|
//! | ROS 1 bridge | `geometry_msgs/Twist` | `std_msgs/String` |
//! | ROS 2 bus | `geometry_msgs/msg/Twist` | `std_msgs/msg/String` |
//!
//! Neither adapter reconnects on its own; callers reconnect explicitly.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Mutex;

use super::ws_link::WsLink;
use super::{InboundKind, InboundMessage, InboundSink, ProtocolAdapter, RobotLink};
use crate::domain::{CommunicationConfig, ProtocolKind, ResolvedTopics, RobotId, VelocityVector};
use crate::error::GatewayError;

/// ROS generation, selecting message type names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosDialect {
    /// ROS 1 through `rosbridge_server`.
    Ros1,
    /// ROS 2 through the bus node's bridge.
    Ros2,
}

impl RosDialect {
    /// Velocity message type.
    #[must_use]
    pub const fn twist_type(&self) -> &'static str {
        match self {
            Self::Ros1 => "geometry_msgs/Twist",
            Self::Ros2 => "geometry_msgs/msg/Twist",
        }
    }

    /// Message type used for status, telemetry, and heartbeat topics.
    #[must_use]
    pub const fn string_type(&self) -> &'static str {
        match self {
            Self::Ros1 => "std_msgs/String",
            Self::Ros2 => "std_msgs/msg/String",
        }
    }
}

/// Builds a rosbridge `advertise` operation.
#[must_use]
pub fn advertise(topic: &str, msg_type: &str) -> Value {
    json!({"op": "advertise", "topic": topic, "type": msg_type})
}

/// Builds a rosbridge `unadvertise` operation.
#[must_use]
pub fn unadvertise(topic: &str) -> Value {
    json!({"op": "unadvertise", "topic": topic})
}

/// Builds a rosbridge `subscribe` operation.
#[must_use]
pub fn subscribe(topic: &str, msg_type: &str) -> Value {
    json!({"op": "subscribe", "topic": topic, "type": msg_type})
}

/// Builds a rosbridge `unsubscribe` operation.
#[must_use]
pub fn unsubscribe(topic: &str) -> Value {
    json!({"op": "unsubscribe", "topic": topic})
}

/// Builds a rosbridge `publish` of a `Twist` on `topic`.
#[must_use]
pub fn publish_twist(topic: &str, velocity: &VelocityVector) -> Value {
    json!({
        "op": "publish",
        "topic": topic,
        "msg": {
            "linear": {"x": velocity.linear.x, "y": velocity.linear.y, "z": velocity.linear.z},
            "angular": {"x": velocity.angular.x, "y": velocity.angular.y, "z": velocity.angular.z},
        },
    })
}

/// Decodes an inbound rosbridge frame.
///
/// Only `publish` operations on the robot's status, telemetry, or heartbeat
/// topics are surfaced. A `std_msgs/String` body whose `data` holds JSON is
/// unwrapped.
#[must_use]
pub fn decode_frame(robot_id: RobotId, topics: &ResolvedTopics, text: &str) -> Option<InboundMessage> {
    let frame: Value = serde_json::from_str(text).ok()?;
    if frame.get("op").and_then(Value::as_str) != Some("publish") {
        return None;
    }
    let topic = frame.get("topic").and_then(Value::as_str)?;
    let kind = InboundKind::for_topic(topics, topic)?;
    let msg = frame.get("msg").cloned().unwrap_or(Value::Null);
    let payload = match msg.get("data") {
        Some(Value::String(data)) => {
            serde_json::from_str(data).unwrap_or_else(|_| Value::String(data.clone()))
        }
        _ => msg,
    };
    Some(InboundMessage::new(robot_id, kind, payload))
}

/// Link to one robot over rosbridge.
#[derive(Debug)]
struct RosLink {
    ws: WsLink,
    topics: ResolvedTopics,
    dialect: RosDialect,
    subscribed: Mutex<Vec<String>>,
}

impl RosLink {
    async fn subscribe_topics(&self, names: &[&str]) -> Result<(), GatewayError> {
        let mut subscribed = self.subscribed.lock().await;
        for &topic in names {
            if subscribed.iter().any(|t| t == topic) {
                continue;
            }
            self.ws
                .send_json(&subscribe(topic, self.dialect.string_type()))
                .await?;
            subscribed.push(topic.to_string());
        }
        Ok(())
    }
}

#[async_trait]
impl RobotLink for RosLink {
    async fn publish_command(&self, velocity: &VelocityVector) -> Result<(), GatewayError> {
        self.ws
            .send_json(&publish_twist(&self.topics.command, velocity))
            .await
    }

    async fn subscribe_status(&self) -> Result<(), GatewayError> {
        self.subscribe_topics(&[self.topics.status.as_str(), self.topics.heartbeat.as_str()])
            .await
    }

    async fn subscribe_telemetry(&self) -> Result<(), GatewayError> {
        self.subscribe_topics(&[self.topics.telemetry.as_str()]).await
    }

    fn is_alive(&self) -> bool {
        self.ws.is_alive()
    }

    async fn disconnect(&self) -> Result<(), GatewayError> {
        let topics: Vec<String> = self.subscribed.lock().await.drain(..).collect();
        if self.ws.is_alive() {
            for topic in &topics {
                if let Err(e) = self.ws.send_json(&unsubscribe(topic)).await {
                    tracing::debug!(topic = %topic, error = %e, "rosbridge unsubscribe failed");
                }
            }
            if let Err(e) = self.ws.send_json(&unadvertise(&self.topics.command)).await {
                tracing::debug!(error = %e, "rosbridge unadvertise failed");
            }
        }
        self.ws.close().await;
        Ok(())
    }
}

async fn open_ros_link(
    url: &str,
    dialect: RosDialect,
    keepalive: Duration,
    robot_id: RobotId,
    communication: &CommunicationConfig,
    inbound: InboundSink,
    protocol: ProtocolKind,
) -> Result<Box<dyn RobotLink>, GatewayError> {
    let topics = communication.topics_for(&robot_id.to_string());
    let decode_topics = topics.clone();
    let ws = WsLink::open(url, keepalive, inbound, move |text| {
        decode_frame(robot_id, &decode_topics, text)
    })
    .await
    .map_err(|reason| GatewayError::ConnectFailed { protocol, reason })?;

    ws.send_json(&advertise(&topics.command, dialect.twist_type()))
        .await?;
    tracing::debug!(%robot_id, url, topic = %topics.command, "advertised command topic");

    Ok(Box::new(RosLink {
        ws,
        topics,
        dialect,
        subscribed: Mutex::new(Vec::new()),
    }))
}

/// Adapter for robots running their own `rosbridge_server`.
#[derive(Debug, Clone)]
pub struct RosBridgeAdapter {
    keepalive: Duration,
}

impl RosBridgeAdapter {
    /// Creates the adapter with the given keep-alive interval.
    #[must_use]
    pub const fn new(keepalive: Duration) -> Self {
        Self { keepalive }
    }
}

#[async_trait]
impl ProtocolAdapter for RosBridgeAdapter {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Rosbridge
    }

    async fn connect(
        &self,
        robot_id: RobotId,
        communication: &CommunicationConfig,
        inbound: InboundSink,
    ) -> Result<Box<dyn RobotLink>, GatewayError> {
        open_ros_link(
            &communication.ws_url(),
            RosDialect::Ros1,
            self.keepalive,
            robot_id,
            communication,
            inbound,
            ProtocolKind::Rosbridge,
        )
        .await
    }
}

/// Adapter for robots on the ROS 2 bus, reached through the configured bus
/// node. Topics are namespaced per robot.
#[derive(Debug, Clone)]
pub struct Ros2Adapter {
    node_url: String,
    keepalive: Duration,
}

impl Ros2Adapter {
    /// Creates the adapter for the bus node at `node_url`.
    #[must_use]
    pub fn new(node_url: impl Into<String>, keepalive: Duration) -> Self {
        Self {
            node_url: node_url.into(),
            keepalive,
        }
    }
}

#[async_trait]
impl ProtocolAdapter for Ros2Adapter {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Ros2
    }

    async fn connect(
        &self,
        robot_id: RobotId,
        communication: &CommunicationConfig,
        inbound: InboundSink,
    ) -> Result<Box<dyn RobotLink>, GatewayError> {
        open_ros_link(
            &self.node_url,
            RosDialect::Ros2,
            self.keepalive,
            robot_id,
            communication,
            inbound,
            ProtocolKind::Ros2,
        )
        .await
    }
}
