//! Protocol adapters: one implementation per robot wire protocol.
//!
//! A [`ProtocolAdapter`] opens a [`RobotLink`] to one robot. The link
//! exposes the same capability set whatever the transport underneath:
//! publish a velocity command, subscribe to status and telemetry, report
//! liveness, and disconnect. Inbound traffic leaves the link as
//! protocol-neutral [`InboundMessage`]s on an mpsc channel owned by the
//! connection registry.
//!
//! Adapter availability is decided once, at construction of the
//! [`AdapterSet`]; a kind that cannot run is an explicit
//! [`AdapterSlot::Disabled`] rather than a missing entry.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use utoipa::ToSchema;

use crate::config::TransportConfig;
use crate::domain::{CommunicationConfig, ProtocolKind, ResolvedTopics, RobotId, VelocityVector};
use crate::error::GatewayError;

pub mod mqtt;
pub mod ros;
pub mod websocket;
mod ws_link;

#[cfg(test)]
pub(crate) mod mock;

pub use mqtt::{MqttAdapter, ReconnectPolicy};
pub use ros::{Ros2Adapter, RosBridgeAdapter, RosDialect};
pub use websocket::WebSocketAdapter;

/// Kind of an inbound robot message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InboundKind {
    /// Robot-reported status.
    Status,
    /// Sensor, battery, or pose data.
    Telemetry,
    /// Liveness signal.
    Heartbeat,
}

impl InboundKind {
    /// Classifies a topic against the resolved topic names of a robot.
    #[must_use]
    pub fn for_topic(topics: &ResolvedTopics, topic: &str) -> Option<Self> {
        if topic == topics.status {
            Some(Self::Status)
        } else if topic == topics.telemetry {
            Some(Self::Telemetry)
        } else if topic == topics.heartbeat {
            Some(Self::Heartbeat)
        } else {
            None
        }
    }
}

/// Protocol-neutral inbound message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InboundMessage {
    /// Source robot.
    pub robot_id: RobotId,
    /// What the message carries.
    pub message_type: InboundKind,
    /// Decoded payload.
    pub payload: serde_json::Value,
    /// When the gateway received it.
    pub timestamp: DateTime<Utc>,
}

impl InboundMessage {
    /// Creates a message stamped with the current time.
    #[must_use]
    pub fn new(robot_id: RobotId, message_type: InboundKind, payload: serde_json::Value) -> Self {
        Self {
            robot_id,
            message_type,
            payload,
            timestamp: Utc::now(),
        }
    }
}

/// Channel end an adapter pushes inbound messages into.
pub type InboundSink = mpsc::Sender<InboundMessage>;

/// Decodes a payload that may be JSON text, falling back to a JSON string.
#[must_use]
pub fn decode_payload(bytes: &[u8]) -> serde_json::Value {
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

/// Opens links to robots over one wire protocol.
#[async_trait]
pub trait ProtocolAdapter: Send + Sync + fmt::Debug {
    /// Protocol this adapter speaks.
    fn kind(&self) -> ProtocolKind;

    /// Opens a link to `robot_id`. Inbound traffic goes to `inbound`.
    ///
    /// The caller bounds this call with its connect timeout.
    async fn connect(
        &self,
        robot_id: RobotId,
        communication: &CommunicationConfig,
        inbound: InboundSink,
    ) -> Result<Box<dyn RobotLink>, GatewayError>;
}

/// Live link to one robot.
#[async_trait]
pub trait RobotLink: Send + Sync + fmt::Debug {
    /// Publishes a velocity command in the protocol's native shape.
    async fn publish_command(&self, velocity: &VelocityVector) -> Result<(), GatewayError>;

    /// Starts receiving status and heartbeat messages.
    async fn subscribe_status(&self) -> Result<(), GatewayError>;

    /// Starts receiving telemetry.
    async fn subscribe_telemetry(&self) -> Result<(), GatewayError>;

    /// Returns `false` once the transport is known to be down.
    fn is_alive(&self) -> bool;

    /// Unsubscribes, closes the transport, and stops every timer the link
    /// owns.
    async fn disconnect(&self) -> Result<(), GatewayError>;
}

/// Availability of one adapter kind.
#[derive(Debug, Clone)]
pub enum AdapterSlot {
    /// Adapter ready to connect.
    Ready(Arc<dyn ProtocolAdapter>),
    /// Adapter could not be initialized.
    Disabled {
        /// Why the adapter is off.
        reason: String,
    },
}

/// Availability entry exposed by the protocols catalog.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProtocolAvailability {
    /// Protocol kind.
    pub protocol: ProtocolKind,
    /// Whether connects of this kind can succeed.
    pub available: bool,
    /// Why the adapter is disabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// The four adapter slots, fixed at construction.
#[derive(Debug, Clone)]
pub struct AdapterSet {
    ros2: AdapterSlot,
    rosbridge: AdapterSlot,
    mqtt: AdapterSlot,
    websocket: AdapterSlot,
}

impl AdapterSet {
    /// Builds the adapter set from the transport configuration, logging
    /// each disabled kind once.
    #[must_use]
    pub fn from_config(config: &TransportConfig) -> Self {
        let ros2 = match &config.ros2_node_url {
            Some(url) => AdapterSlot::Ready(Arc::new(Ros2Adapter::new(
                url.clone(),
                config.keepalive_interval,
            ))),
            None => AdapterSlot::Disabled {
                reason: "ROS2_NODE_URL is not configured".to_string(),
            },
        };
        let rosbridge = if config.rosbridge_enabled {
            AdapterSlot::Ready(Arc::new(RosBridgeAdapter::new(config.keepalive_interval)))
        } else {
            AdapterSlot::Disabled {
                reason: "disabled by ROSBRIDGE_ENABLED".to_string(),
            }
        };
        let mqtt = match config.mqtt_broker_url.as_deref().map(MqttAdapter::from_broker_url) {
            Some(Ok(adapter)) => AdapterSlot::Ready(Arc::new(adapter.with_policy(
                ReconnectPolicy::from_config(config),
                config.keepalive_interval,
            ))),
            Some(Err(reason)) => AdapterSlot::Disabled { reason },
            None => AdapterSlot::Disabled {
                reason: "MQTT_BROKER_URL is not configured".to_string(),
            },
        };
        let websocket = if config.websocket_enabled {
            AdapterSlot::Ready(Arc::new(WebSocketAdapter::new(config.keepalive_interval)))
        } else {
            AdapterSlot::Disabled {
                reason: "disabled by WEBSOCKET_ENABLED".to_string(),
            }
        };

        let set = Self {
            ros2,
            rosbridge,
            mqtt,
            websocket,
        };
        for kind in ProtocolKind::ALL {
            match set.slot(kind) {
                AdapterSlot::Ready(_) => tracing::info!(protocol = %kind, "protocol adapter ready"),
                AdapterSlot::Disabled { reason } => {
                    tracing::warn!(protocol = %kind, reason = %reason, "protocol adapter unavailable");
                }
            }
        }
        set
    }

    /// Builds a set with every kind disabled.
    #[must_use]
    pub fn disabled() -> Self {
        let off = || AdapterSlot::Disabled {
            reason: "not configured".to_string(),
        };
        Self {
            ros2: off(),
            rosbridge: off(),
            mqtt: off(),
            websocket: off(),
        }
    }

    /// Installs `adapter` in the slot of its kind.
    #[must_use]
    pub fn with(mut self, adapter: Arc<dyn ProtocolAdapter>) -> Self {
        let kind = adapter.kind();
        let slot = AdapterSlot::Ready(adapter);
        match kind {
            ProtocolKind::Ros2 => self.ros2 = slot,
            ProtocolKind::Rosbridge => self.rosbridge = slot,
            ProtocolKind::Mqtt => self.mqtt = slot,
            ProtocolKind::Websocket => self.websocket = slot,
        }
        self
    }

    /// Returns the slot of `kind`.
    #[must_use]
    pub const fn slot(&self, kind: ProtocolKind) -> &AdapterSlot {
        match kind {
            ProtocolKind::Ros2 => &self.ros2,
            ProtocolKind::Rosbridge => &self.rosbridge,
            ProtocolKind::Mqtt => &self.mqtt,
            ProtocolKind::Websocket => &self.websocket,
        }
    }

    /// Returns the adapter of `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ProtocolUnavailable`] without any network
    /// activity when the kind is disabled.
    pub fn resolve(&self, kind: ProtocolKind) -> Result<Arc<dyn ProtocolAdapter>, GatewayError> {
        match self.slot(kind) {
            AdapterSlot::Ready(adapter) => Ok(Arc::clone(adapter)),
            AdapterSlot::Disabled { reason } => Err(GatewayError::ProtocolUnavailable {
                protocol: kind,
                reason: reason.clone(),
            }),
        }
    }

    /// Returns the availability of every kind, in catalog order.
    #[must_use]
    pub fn catalog(&self) -> Vec<ProtocolAvailability> {
        ProtocolKind::ALL
            .into_iter()
            .map(|protocol| match self.slot(protocol) {
                AdapterSlot::Ready(_) => ProtocolAvailability {
                    protocol,
                    available: true,
                    reason: None,
                },
                AdapterSlot::Disabled { reason } => ProtocolAvailability {
                    protocol,
                    available: false,
                    reason: Some(reason.clone()),
                },
            })
            .collect()
    }
}
