//! WebSocket message types: envelope, commands, and events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{CommandKind, ControlMode, EventTopic, RobotId};
use crate::error::GatewayError;

/// Top-level WebSocket message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessage {
    /// Client-provided ID for requests; server-generated for events.
    pub id: String,
    /// Message type discriminator.
    #[serde(rename = "type")]
    pub msg_type: WsMessageType,
    /// ISO-8601 timestamp.
    pub timestamp: DateTime<Utc>,
    /// Variant-specific payload.
    pub payload: serde_json::Value,
}

impl WsMessage {
    /// Response to the request with `id`.
    #[must_use]
    pub fn response(id: String, payload: serde_json::Value) -> Self {
        Self {
            id,
            msg_type: WsMessageType::Response,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Error reply carrying the standard error body.
    #[must_use]
    pub fn error(id: String, error: &GatewayError) -> Self {
        Self {
            id,
            msg_type: WsMessageType::Error,
            timestamp: Utc::now(),
            payload: serde_json::to_value(error.to_body()).unwrap_or_default(),
        }
    }

    /// Server-pushed event.
    #[must_use]
    pub fn event(payload: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            msg_type: WsMessageType::Event,
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// Discriminator for WebSocket message types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WsMessageType {
    /// Client → Server command.
    Command,
    /// Server → Client response to a command.
    Response,
    /// Server → Client broadcast event.
    Event,
    /// Server → Client error.
    Error,
}

/// Commands that a client can send over WebSocket, carried in the payload
/// of a `command` envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WsCommand {
    /// Subscribe to events for specific robots.
    Subscribe {
        /// Robot IDs to follow. Use `["*"]` for all robots.
        robot_ids: Vec<String>,
        /// Topic filter; empty or absent means every topic.
        #[serde(default)]
        topics: Vec<EventTopic>,
    },
    /// Stop following robots.
    Unsubscribe {
        /// Robot IDs to drop; `"*"` drops the wildcard.
        robot_ids: Vec<String>,
    },
    /// Take exclusive control of a robot.
    StartSession {
        /// Target robot.
        robot_id: RobotId,
        /// Control mode.
        #[serde(default)]
        mode: ControlMode,
        /// Robot model reference.
        #[serde(default)]
        urdf_ref: Option<String>,
    },
    /// Forward a command to a held robot.
    SendCommand {
        /// Target robot.
        robot_id: RobotId,
        /// The command, tagged by `type`.
        data: CommandKind,
    },
    /// Release a held robot.
    EndSession {
        /// Target robot.
        robot_id: RobotId,
    },
    /// Query the robot's connection.
    ConnectionStatus {
        /// Target robot.
        robot_id: RobotId,
    },
}

/// Splits raw id strings into robot ids and the wildcard flag. Unparsable
/// entries are skipped.
#[must_use]
pub fn parse_robot_ids(raw: &[String]) -> (Vec<RobotId>, bool) {
    let mut ids = Vec::new();
    let mut wildcard = false;
    for s in raw {
        if s == "*" {
            wildcard = true;
        } else if let Ok(id) = s.parse::<RobotId>() {
            ids.push(id);
        }
    }
    (ids, wildcard)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::GestureType;

    #[test]
    fn gesture_command_parses() {
        let id = RobotId::new();
        let text = format!(
            r#"{{"command":"send_command","robot_id":"{id}","data":{{"type":"gesture","gesture_type":"point","confidence":0.9}}}}"#
        );
        let Ok(WsCommand::SendCommand { robot_id, data }) = serde_json::from_str::<WsCommand>(&text)
        else {
            panic!("send_command should parse");
        };
        assert_eq!(robot_id, id);
        assert!(matches!(
            data,
            CommandKind::Gesture {
                gesture_type: GestureType::Point,
                ..
            }
        ));
    }

    #[test]
    fn start_session_defaults_to_manual() {
        let id = RobotId::new();
        let text = format!(r#"{{"command":"start_session","robot_id":"{id}"}}"#);
        let Ok(WsCommand::StartSession { mode, urdf_ref, .. }) =
            serde_json::from_str::<WsCommand>(&text)
        else {
            panic!("start_session should parse");
        };
        assert_eq!(mode, ControlMode::Manual);
        assert!(urdf_ref.is_none());
    }

    #[test]
    fn subscribe_defaults_topics() {
        let Ok(WsCommand::Subscribe { robot_ids, topics }) =
            serde_json::from_str::<WsCommand>(r#"{"command":"subscribe","robot_ids":["*"]}"#)
        else {
            panic!("subscribe should parse");
        };
        assert_eq!(robot_ids, vec!["*".to_string()]);
        assert!(topics.is_empty());
    }

    #[test]
    fn robot_id_parsing_handles_wildcard_and_garbage() {
        let id = RobotId::new();
        let (ids, wildcard) =
            parse_robot_ids(&[id.to_string(), "*".to_string(), "nope".to_string()]);
        assert_eq!(ids, vec![id]);
        assert!(wildcard);
    }
}
