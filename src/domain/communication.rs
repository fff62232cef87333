//! Robot communication descriptor: protocol kind, endpoint, and topic names.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Wire protocol a robot speaks.
///
/// Selects the protocol adapter used by the connection registry. The set
/// is closed: every call site matches all four kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolKind {
    /// ROS 2 pub/sub bus, reached through the configured bus node.
    Ros2,
    /// Legacy ROS bridge (`rosbridge_server`) over WebSocket.
    Rosbridge,
    /// MQTT broker with per-robot topics.
    Mqtt,
    /// Raw JSON-over-WebSocket transport.
    Websocket,
}

impl ProtocolKind {
    /// All protocol kinds, in catalog order.
    pub const ALL: [Self; 4] = [Self::Ros2, Self::Rosbridge, Self::Mqtt, Self::Websocket];

    /// Returns the protocol kind as a static string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ros2 => "ros2",
            Self::Rosbridge => "rosbridge",
            Self::Mqtt => "mqtt",
            Self::Websocket => "websocket",
        }
    }

    /// Default port used when a descriptor carries a bare host name.
    #[must_use]
    pub const fn default_port(&self) -> u16 {
        match self {
            Self::Ros2 | Self::Rosbridge => 9090,
            Self::Mqtt => 1883,
            Self::Websocket => 8080,
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Topic names used for command, status, telemetry, and heartbeat traffic.
///
/// Any name left unset falls back to the protocol's conventional default
/// (see [`CommunicationConfig::topics_for`]).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TopicNames {
    /// Velocity command topic (e.g. `/cmd_vel`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Robot status topic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Telemetry topic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telemetry: Option<String>,
    /// Heartbeat topic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat: Option<String>,
}

/// Fully resolved topic names for one robot connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTopics {
    /// Velocity command topic.
    pub command: String,
    /// Status topic.
    pub status: String,
    /// Telemetry topic.
    pub telemetry: String,
    /// Heartbeat topic.
    pub heartbeat: String,
}

/// How to reach a robot: protocol, endpoint, port, and topic names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CommunicationConfig {
    /// Wire protocol.
    pub protocol: ProtocolKind,
    /// Host name or full `ws://` / `wss://` URL. Ignored for MQTT, which
    /// uses the broker from the gateway configuration.
    #[serde(default)]
    pub endpoint: String,
    /// Port; defaults to [`ProtocolKind::default_port`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Optional topic namespace (ROS 2 and MQTT). Defaults to the robot id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Topic overrides.
    #[serde(default)]
    pub topics: TopicNames,
}

impl CommunicationConfig {
    /// Creates a descriptor with default port and topics.
    #[must_use]
    pub fn new(protocol: ProtocolKind, endpoint: impl Into<String>) -> Self {
        Self {
            protocol,
            endpoint: endpoint.into(),
            port: None,
            namespace: None,
            topics: TopicNames::default(),
        }
    }

    /// Returns the WebSocket URL for WebSocket-based protocols.
    ///
    /// A full `ws://` or `wss://` endpoint is used verbatim; a bare host is
    /// combined with the configured (or default) port.
    #[must_use]
    pub fn ws_url(&self) -> String {
        let endpoint = self.endpoint.trim();
        if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
            return endpoint.to_string();
        }
        let port = self.port.unwrap_or_else(|| self.protocol.default_port());
        format!("ws://{endpoint}:{port}")
    }

    /// Resolves topic names for `robot_key`, filling unset names with the
    /// protocol's defaults.
    ///
    /// ROS-style protocols use absolute topics (`/cmd_vel`), ROS 2 prefixes
    /// them with the namespace, and MQTT uses `robots/<ns>/<leaf>`.
    #[must_use]
    pub fn topics_for(&self, robot_key: &str) -> ResolvedTopics {
        let ns = self.namespace.as_deref().unwrap_or(robot_key);
        let default = |leaf: &str| match self.protocol {
            ProtocolKind::Rosbridge => format!("/{leaf}"),
            ProtocolKind::Ros2 => format!("/{ns}/{leaf}"),
            ProtocolKind::Mqtt => format!("robots/{ns}/{leaf}"),
            ProtocolKind::Websocket => leaf.to_string(),
        };
        ResolvedTopics {
            command: self.topics.command.clone().unwrap_or_else(|| default("cmd_vel")),
            status: self.topics.status.clone().unwrap_or_else(|| default("status")),
            telemetry: self
                .topics
                .telemetry
                .clone()
                .unwrap_or_else(|| default("telemetry")),
            heartbeat: self
                .topics
                .heartbeat
                .clone()
                .unwrap_or_else(|| default("heartbeat")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_from_bare_host_uses_default_port() {
        let comm = CommunicationConfig::new(ProtocolKind::Rosbridge, "10.0.0.5");
        assert_eq!(comm.ws_url(), "ws://10.0.0.5:9090");
    }

    #[test]
    fn ws_url_keeps_full_url() {
        let comm = CommunicationConfig::new(ProtocolKind::Websocket, "wss://bot.local/ctl");
        assert_eq!(comm.ws_url(), "wss://bot.local/ctl");
    }

    #[test]
    fn ws_url_honours_explicit_port() {
        let mut comm = CommunicationConfig::new(ProtocolKind::Websocket, "bot.local");
        comm.port = Some(7000);
        assert_eq!(comm.ws_url(), "ws://bot.local:7000");
    }

    #[test]
    fn default_topics_per_protocol() {
        let ros = CommunicationConfig::new(ProtocolKind::Rosbridge, "h").topics_for("r1");
        assert_eq!(ros.command, "/cmd_vel");

        let ros2 = CommunicationConfig::new(ProtocolKind::Ros2, "h").topics_for("r1");
        assert_eq!(ros2.command, "/r1/cmd_vel");
        assert_eq!(ros2.telemetry, "/r1/telemetry");

        let mut mqtt = CommunicationConfig::new(ProtocolKind::Mqtt, "");
        mqtt.namespace = Some("arm7".to_string());
        assert_eq!(mqtt.topics_for("r1").status, "robots/arm7/status");
    }

    #[test]
    fn topic_overrides_win() {
        let mut comm = CommunicationConfig::new(ProtocolKind::Rosbridge, "h");
        comm.topics.command = Some("/base/cmd".to_string());
        let topics = comm.topics_for("r1");
        assert_eq!(topics.command, "/base/cmd");
        assert_eq!(topics.status, "/status");
    }

    #[test]
    fn protocol_kind_serde_names() {
        let Ok(kind) = serde_json::from_str::<ProtocolKind>("\"rosbridge\"") else {
            panic!("deserialization failed");
        };
        assert_eq!(kind, ProtocolKind::Rosbridge);
        assert_eq!(ProtocolKind::Ros2.to_string(), "ros2");
    }
}
