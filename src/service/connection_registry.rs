//! Connection registry: the robot ID to live link arena.
//!
//! Each robot owns one slot behind its own `tokio::sync::Mutex`. Connect,
//! send, and disconnect for the same robot are serialized on that mutex;
//! different robots never contend. Every network call made while the slot
//! is locked is bounded by a timeout from [`TransportConfig`], so a stuck
//! adapter fails the operation instead of wedging the slot.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;
use utoipa::ToSchema;

use crate::config::{TransportConfig, millis};
use crate::domain::translator;
use crate::domain::{
    Command, CommunicationConfig, EventBus, ProtocolKind, RobotEvent, RobotId, RobotRegistry,
    RobotStatus, VelocityVector,
};
use crate::error::GatewayError;
use crate::protocol::{AdapterSet, InboundKind, InboundMessage, ProtocolAdapter, RobotLink};

/// Derived connection state of one robot.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConnectionStatus {
    /// Robot identifier.
    pub robot_id: RobotId,
    /// Whether a live link exists.
    pub connected: bool,
    /// Protocol of the link, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<ProtocolKind>,
    /// When the link was opened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<DateTime<Utc>>,
    /// When this status was computed.
    pub last_queried_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Connection {
    protocol: ProtocolKind,
    generation: u64,
    link: Box<dyn RobotLink>,
    connected_at: DateTime<Utc>,
    pump: JoinHandle<()>,
}

type Slot = Arc<Mutex<Option<Connection>>>;

/// Owns every live robot link.
#[derive(Debug)]
pub struct ConnectionRegistry {
    adapters: AdapterSet,
    robots: Arc<RobotRegistry>,
    event_bus: EventBus,
    config: TransportConfig,
    slots: RwLock<HashMap<RobotId, Slot>>,
    generations: AtomicU64,
}

impl ConnectionRegistry {
    /// Creates a registry dispatching to `adapters`.
    #[must_use]
    pub fn new(
        adapters: AdapterSet,
        robots: Arc<RobotRegistry>,
        event_bus: EventBus,
        config: TransportConfig,
    ) -> Self {
        Self {
            adapters,
            robots,
            event_bus,
            config,
            slots: RwLock::new(HashMap::new()),
            generations: AtomicU64::new(0),
        }
    }

    /// Returns the adapter set.
    #[must_use]
    pub const fn adapters(&self) -> &AdapterSet {
        &self.adapters
    }

    async fn slot(&self, robot_id: RobotId) -> Option<Slot> {
        self.slots.read().await.get(&robot_id).map(Arc::clone)
    }

    async fn slot_or_insert(&self, robot_id: RobotId) -> Slot {
        if let Some(slot) = self.slot(robot_id).await {
            return slot;
        }
        let mut map = self.slots.write().await;
        Arc::clone(map.entry(robot_id).or_default())
    }

    /// Opens a link to `robot_id` with the adapter matching
    /// `communication.protocol`.
    ///
    /// A second caller racing for the same robot waits for the first and
    /// then receives [`GatewayError::AlreadyConnected`]. A slot whose link
    /// has died is replaced.
    ///
    /// # Errors
    ///
    /// [`GatewayError::ProtocolUnavailable`] (immediately) for disabled
    /// kinds, [`GatewayError::AlreadyConnected`], [`GatewayError::Timeout`],
    /// or the adapter's own failure.
    pub async fn connect(
        &self,
        robot_id: RobotId,
        communication: &CommunicationConfig,
    ) -> Result<ConnectionStatus, GatewayError> {
        let protocol = communication.protocol;
        let adapter = self.adapters.resolve(protocol)?;
        let slot = self.slot_or_insert(robot_id).await;
        let mut guard = slot.lock().await;

        let stale = match guard.as_ref() {
            Some(existing) if existing.link.is_alive() => {
                return Err(GatewayError::AlreadyConnected(robot_id));
            }
            Some(_) => guard.take(),
            None => None,
        };
        let stale_protocol = match stale {
            Some(stale) => {
                tracing::info!(%robot_id, protocol = %stale.protocol, "replacing dead link");
                Some(self.close_link(robot_id, stale).await)
            }
            None => None,
        };

        let opened = self
            .open_link(robot_id, adapter.as_ref(), communication, &slot)
            .await;
        let connected_at = match opened {
            Ok(connection) => {
                let at = connection.connected_at;
                *guard = Some(connection);
                Ok(at)
            }
            Err(e) => Err(e),
        };
        drop(guard);
        // Announced after the slot is released; status shifts take robot locks.
        if let Some(stale_protocol) = stale_protocol {
            self.announce_disconnected(robot_id, stale_protocol).await;
        }
        let connected_at = connected_at?;

        tracing::info!(%robot_id, %protocol, "robot connected");
        let _ = self.event_bus.publish(RobotEvent::ConnectionChanged {
            robot_id,
            connected: true,
            protocol,
            timestamp: connected_at,
        });
        shift_status(
            &self.robots,
            &self.event_bus,
            robot_id,
            &[RobotStatus::Offline],
            RobotStatus::Online,
        )
        .await;

        Ok(ConnectionStatus {
            robot_id,
            connected: true,
            protocol: Some(protocol),
            connected_at: Some(connected_at),
            last_queried_at: Utc::now(),
        })
    }

    /// Translates `command` and forwards it to the robot's link. Never
    /// retries.
    ///
    /// # Errors
    ///
    /// [`GatewayError::NotConnected`] without a link,
    /// [`GatewayError::SendFailure`] or [`GatewayError::Timeout`] from the
    /// transport.
    pub async fn send(
        &self,
        robot_id: RobotId,
        command: &Command,
    ) -> Result<VelocityVector, GatewayError> {
        let slot = self
            .slot(robot_id)
            .await
            .ok_or(GatewayError::NotConnected(robot_id))?;
        let guard = slot.lock().await;
        let connection = guard
            .as_ref()
            .ok_or(GatewayError::NotConnected(robot_id))?;
        if !connection.link.is_alive() {
            return Err(GatewayError::SendFailure(format!(
                "link to robot {robot_id} is down"
            )));
        }

        let velocity = translator::translate(command);
        self.bounded_send(connection.link.publish_command(&velocity))
            .await?;
        tracing::debug!(%robot_id, command = command.kind().type_str(), "command forwarded");
        Ok(velocity)
    }

    /// Closes the robot's link. Idempotent: returns `false` when there was
    /// nothing to close. Teardown failures are logged, never returned.
    pub async fn disconnect(&self, robot_id: RobotId) -> bool {
        let Some(slot) = self.slot(robot_id).await else {
            return false;
        };
        let taken = slot.lock().await.take();
        match taken {
            Some(connection) => {
                self.teardown(robot_id, connection).await;
                true
            }
            None => false,
        }
    }

    /// Returns the derived connection status.
    pub async fn status(&self, robot_id: RobotId) -> ConnectionStatus {
        let mut status = ConnectionStatus {
            robot_id,
            connected: false,
            protocol: None,
            connected_at: None,
            last_queried_at: Utc::now(),
        };
        if let Some(slot) = self.slot(robot_id).await
            && let Some(connection) = slot.lock().await.as_ref()
        {
            status.connected = connection.link.is_alive();
            status.protocol = Some(connection.protocol);
            status.connected_at = Some(connection.connected_at);
        }
        status
    }

    /// Returns `true` when a live link exists.
    pub async fn is_connected(&self, robot_id: RobotId) -> bool {
        self.status(robot_id).await.connected
    }

    /// Disconnects every robot concurrently, tolerating individual
    /// failures. Returns how many links were closed.
    pub async fn disconnect_all(&self) -> usize {
        let ids: Vec<RobotId> = self.slots.read().await.keys().copied().collect();
        let closed = futures_util::future::join_all(ids.into_iter().map(|id| self.disconnect(id)))
            .await
            .into_iter()
            .filter(|closed| *closed)
            .count();
        tracing::info!(closed, "all robot links closed");
        closed
    }

    async fn bounded_send<F>(&self, fut: F) -> Result<(), GatewayError>
    where
        F: std::future::Future<Output = Result<(), GatewayError>>,
    {
        tokio::time::timeout(self.config.send_timeout, fut)
            .await
            .map_err(|_| GatewayError::Timeout {
                operation: "send",
                after_ms: millis(self.config.send_timeout),
            })?
    }

    /// Connects through `adapter`, subscribes to the robot's topics, and
    /// starts the inbound pump. Subscription failures are logged only.
    async fn open_link(
        &self,
        robot_id: RobotId,
        adapter: &dyn ProtocolAdapter,
        communication: &CommunicationConfig,
        slot: &Slot,
    ) -> Result<Connection, GatewayError> {
        let protocol = communication.protocol;
        let (sink, inbound) = mpsc::channel(self.config.inbound_buffer);
        let link = tokio::time::timeout(
            self.config.connect_timeout,
            adapter.connect(robot_id, communication, sink),
        )
        .await
        .map_err(|_| GatewayError::Timeout {
            operation: "connect",
            after_ms: millis(self.config.connect_timeout),
        })??;

        for (what, result) in [
            ("status", self.bounded_send(link.subscribe_status()).await),
            ("telemetry", self.bounded_send(link.subscribe_telemetry()).await),
        ] {
            if let Err(e) = result {
                tracing::warn!(%robot_id, %protocol, subscription = what, error = %e, "subscription failed");
            }
        }

        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        let pump = tokio::spawn(pump_inbound(
            inbound,
            LinkWatch {
                robot_id,
                generation,
                slot: Arc::clone(slot),
                robots: Arc::clone(&self.robots),
                event_bus: self.event_bus.clone(),
                disconnect_timeout: self.config.disconnect_timeout,
            },
        ));
        Ok(Connection {
            protocol,
            generation,
            link,
            connected_at: Utc::now(),
            pump,
        })
    }

    async fn teardown(&self, robot_id: RobotId, connection: Connection) {
        let protocol = self.close_link(robot_id, connection).await;
        self.announce_disconnected(robot_id, protocol).await;
    }

    /// Closes the link (bounded) and stops its pump. Touches no robot
    /// state, so it is safe under the slot lock.
    async fn close_link(&self, robot_id: RobotId, connection: Connection) -> ProtocolKind {
        let protocol = connection.protocol;
        match tokio::time::timeout(self.config.disconnect_timeout, connection.link.disconnect())
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(%robot_id, %protocol, error = %e, "disconnect failed"),
            Err(_) => tracing::warn!(%robot_id, %protocol, "disconnect timed out"),
        }
        connection.pump.abort();
        protocol
    }

    async fn announce_disconnected(&self, robot_id: RobotId, protocol: ProtocolKind) {
        announce_link_down(&self.robots, &self.event_bus, robot_id, protocol).await;
    }
}

async fn announce_link_down(
    robots: &RobotRegistry,
    event_bus: &EventBus,
    robot_id: RobotId,
    protocol: ProtocolKind,
) {
    tracing::info!(%robot_id, %protocol, "robot disconnected");
    let _ = event_bus.publish(RobotEvent::ConnectionChanged {
        robot_id,
        connected: false,
        protocol,
        timestamp: Utc::now(),
    });
    shift_status(
        robots,
        event_bus,
        robot_id,
        &[RobotStatus::Online, RobotStatus::Charging],
        RobotStatus::Offline,
    )
    .await;
}

/// Moves the robot to `to` when its status is one of `from`.
async fn shift_status(
    robots: &RobotRegistry,
    event_bus: &EventBus,
    robot_id: RobotId,
    from: &[RobotStatus],
    to: RobotStatus,
) {
    let Ok(lock) = robots.get(robot_id).await else {
        return;
    };
    let changed = {
        let mut robot = lock.write().await;
        from.contains(&robot.status) && robot.set_status(to)
    };
    if changed {
        let _ = event_bus.publish(RobotEvent::StatusChanged {
            robot_id,
            status: to,
            timestamp: Utc::now(),
        });
    }
}

/// What a link's pump needs to notice that the link died under it.
#[derive(Debug)]
struct LinkWatch {
    robot_id: RobotId,
    generation: u64,
    slot: Slot,
    robots: Arc<RobotRegistry>,
    event_bus: EventBus,
    disconnect_timeout: Duration,
}

/// Drains one link's inbound channel into the robot cache and the bus.
///
/// The channel closes when the link's reader stops. If the slot still
/// holds this link at that point nobody asked for the disconnect: the
/// link is removed and announced as lost.
async fn pump_inbound(mut inbound: mpsc::Receiver<InboundMessage>, watch: LinkWatch) {
    while let Some(message) = inbound.recv().await {
        apply_inbound(&watch.robots, &watch.event_bus, message).await;
    }

    let lost = {
        let mut guard = watch.slot.lock().await;
        match guard.as_ref() {
            Some(current) if current.generation == watch.generation => guard.take(),
            _ => None,
        }
    };
    let Some(connection) = lost else {
        return;
    };
    let robot_id = watch.robot_id;
    let protocol = connection.protocol;
    tracing::warn!(%robot_id, %protocol, "robot link lost");
    if tokio::time::timeout(watch.disconnect_timeout, connection.link.disconnect())
        .await
        .is_err()
    {
        tracing::warn!(%robot_id, %protocol, "cleanup of lost link timed out");
    }
    announce_link_down(&watch.robots, &watch.event_bus, robot_id, protocol).await;
}

/// Applies one inbound message: caches it on the robot and publishes the
/// matching event.
pub(crate) async fn apply_inbound(robots: &RobotRegistry, event_bus: &EventBus, message: InboundMessage) {
    let robot_id = message.robot_id;
    let Ok(lock) = robots.get(robot_id).await else {
        tracing::debug!(%robot_id, "inbound message for unknown robot");
        return;
    };
    match message.message_type {
        InboundKind::Status => {
            let Some(status) = reported_status(&message.payload) else {
                tracing::debug!(%robot_id, payload = %message.payload, "unrecognized status payload");
                return;
            };
            let changed = lock.write().await.apply_reported_status(status);
            if changed {
                let _ = event_bus.publish(RobotEvent::StatusChanged {
                    robot_id,
                    status,
                    timestamp: message.timestamp,
                });
            }
        }
        InboundKind::Telemetry => {
            lock.write()
                .await
                .record_telemetry(message.payload.clone(), message.timestamp);
            let _ = event_bus.publish(RobotEvent::Telemetry {
                robot_id,
                payload: message.payload,
                timestamp: message.timestamp,
            });
        }
        InboundKind::Heartbeat => {
            lock.write().await.record_heartbeat(message.timestamp);
            let _ = event_bus.publish(RobotEvent::Heartbeat {
                robot_id,
                timestamp: message.timestamp,
            });
        }
    }
}

/// Accepts `"online"` or `{"status":"online"}`.
fn reported_status(payload: &serde_json::Value) -> Option<RobotStatus> {
    let raw = payload
        .as_str()
        .or_else(|| payload.get("status").and_then(serde_json::Value::as_str))?;
    raw.parse().ok()
}
