//! Control-session authority: the exclusive-lock state machine per robot.
//!
//! Every session transition happens under the robot's own write lock in
//! the [`RobotRegistry`], which makes the check-and-set on
//! `current_session` atomic: of two racing start requests exactly one
//! sees the robot available. Every method follows the same ordering:
//! authorize → mutate under the lock → drop the lock → network I/O →
//! publish events.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use super::connection_registry::{ConnectionRegistry, ConnectionStatus};
use crate::domain::{
    AccessLevel, AccessPermission, Command, CommandKind, ControlMode, ControlSession, EventBus,
    Operator, Robot, RobotDescriptor, RobotEvent, RobotId, RobotRegistry, RobotStatus,
    RobotSummary, SessionEndReason, SessionState, TelemetrySnapshot, UserId, VelocityVector,
};
use crate::error::{ErrorBody, GatewayError};

/// Outcome of the best-effort connect performed by a session start.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConnectOutcome {
    /// A link is up.
    Connected {
        /// Connection state after the attempt.
        status: ConnectionStatus,
    },
    /// The link could not be opened; the session is still held.
    Failed {
        /// Why the connect failed.
        error: ErrorBody,
    },
}

/// Result of a successful session start.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionGrant {
    /// The new session.
    pub session: ControlSession,
    /// What happened to the connection.
    pub connection: ConnectOutcome,
}

/// Result of a forwarded command.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CommandReceipt {
    /// Target robot.
    pub robot_id: RobotId,
    /// Command type (`manual`, `gesture`, `stop`, `emergency_stop`).
    pub command_type: String,
    /// Velocity forwarded to the adapter.
    pub velocity: VelocityVector,
    /// When the command was issued.
    pub issued_at: DateTime<Utc>,
}

/// Full view of a robot for status queries.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RobotView {
    /// Robot summary.
    #[serde(flatten)]
    pub summary: RobotSummary,
    /// Session state.
    pub session: SessionState,
    /// Latest telemetry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telemetry: Option<TelemetrySnapshot>,
    /// Last heartbeat.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<DateTime<Utc>>,
    /// Connection state.
    pub connection: ConnectionStatus,
    /// Caller's access level.
    pub access_level: AccessLevel,
    /// Explicit grants.
    pub access_permissions: Vec<AccessPermission>,
}

/// Coordinates the robot registry and the connection registry.
///
/// The robot's `current_session`, its status, and the connection arena
/// are only mutated through this type.
#[derive(Debug)]
pub struct SessionAuthority {
    robots: Arc<RobotRegistry>,
    connections: Arc<ConnectionRegistry>,
    event_bus: EventBus,
}

impl SessionAuthority {
    /// Creates the authority.
    #[must_use]
    pub fn new(
        robots: Arc<RobotRegistry>,
        connections: Arc<ConnectionRegistry>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            robots,
            connections,
            event_bus,
        }
    }

    /// Returns the robot registry.
    #[must_use]
    pub const fn robots(&self) -> &Arc<RobotRegistry> {
        &self.robots
    }

    /// Returns the connection registry.
    #[must_use]
    pub const fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.connections
    }

    /// Returns the event bus.
    #[must_use]
    pub const fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    // ── Robot records ───────────────────────────────────────────────────

    /// Registers a robot owned by `descriptor.owner`.
    ///
    /// # Errors
    ///
    /// Propagates [`RobotRegistry::register`] failures.
    pub async fn register_robot(&self, descriptor: RobotDescriptor) -> Result<RobotId, GatewayError> {
        let protocol = descriptor.communication.protocol;
        let owner = descriptor.owner;
        let robot_id = self.robots.register(descriptor).await?;
        tracing::info!(%robot_id, user_id = %owner, %protocol, "robot registered");
        Ok(robot_id)
    }

    /// Lists the robots `operator` can see; fleet admins see all.
    pub async fn list_robots(&self, operator: Operator) -> Vec<RobotSummary> {
        self.robots
            .list_where(|robot| operator.is_admin() || robot.granted_level(operator.user_id).is_some())
            .await
    }

    /// Soft-retires a robot. Requires robot admin; refused while a session
    /// is held.
    ///
    /// # Errors
    ///
    /// [`GatewayError::AccessDenied`], [`GatewayError::NotAvailable`], or
    /// [`GatewayError::RobotNotFound`].
    pub async fn retire_robot(&self, robot_id: RobotId, operator: Operator) -> Result<(), GatewayError> {
        self.robots
            .retire(robot_id, |robot| {
                require_robot_admin(robot, operator)?;
                match robot.holder() {
                    Some(holder) => Err(GatewayError::NotAvailable {
                        robot_id,
                        reason: format!("robot is controlled by {holder}"),
                    }),
                    None => Ok(()),
                }
            })
            .await?;
        self.connections.disconnect(robot_id).await;
        tracing::info!(%robot_id, user_id = %operator.user_id, "robot retired");
        Ok(())
    }

    // ── Session lifecycle ───────────────────────────────────────────────

    /// Grants `user_id` exclusive control of the robot, then connects
    /// best-effort.
    ///
    /// # Errors
    ///
    /// [`GatewayError::AccessDenied`] below `control`,
    /// [`GatewayError::NotAvailable`] when held, faulted, in maintenance, or
    /// retired, or when the session was ended while the link was opening.
    /// A connect failure is not an error: it is reported in
    /// [`SessionGrant::connection`].
    pub async fn start_session(
        &self,
        robot_id: RobotId,
        user_id: UserId,
        mode: ControlMode,
        urdf_ref: Option<String>,
    ) -> Result<SessionGrant, GatewayError> {
        let lock = self.robots.get(robot_id).await?;
        let (session, communication) = {
            let mut robot = lock.write().await;
            require_level(&robot, user_id, AccessLevel::Control)?;
            if let Some(reason) = robot.unavailability() {
                return Err(GatewayError::NotAvailable { robot_id, reason });
            }
            let session = ControlSession {
                robot_id,
                controller_id: user_id,
                started_at: Utc::now(),
                mode,
                urdf_ref,
            };
            robot.current_session = Some(session.clone());
            (session, robot.communication.clone())
        };

        tracing::info!(%robot_id, %user_id, %mode, "session started");
        let _ = self.event_bus.publish(RobotEvent::SessionStarted {
            robot_id,
            controller_id: user_id,
            mode,
            timestamp: session.started_at,
        });

        let connection = match self.connections.connect(robot_id, &communication).await {
            Ok(status) => ConnectOutcome::Connected { status },
            Err(GatewayError::AlreadyConnected(_)) => ConnectOutcome::Connected {
                status: self.connections.status(robot_id).await,
            },
            Err(e) => {
                tracing::warn!(%robot_id, %user_id, error = %e, "session started without a connection");
                ConnectOutcome::Failed { error: e.to_body() }
            }
        };

        if matches!(connection, ConnectOutcome::Connected { .. }) {
            self.settle_link(robot_id, &session).await?;
        }

        Ok(SessionGrant {
            session,
            connection,
        })
    }

    /// Re-checks a session after its connect returned. The robot lock is
    /// not held while connecting, so the session may already be gone: an
    /// ended session leaves no link behind, a faulted robot keeps its link
    /// for monitoring.
    async fn settle_link(&self, robot_id: RobotId, session: &ControlSession) -> Result<(), GatewayError> {
        let (held, faulted) = {
            let lock = self.robots.get(robot_id).await?;
            let robot = lock.read().await;
            (
                robot.current_session.as_ref() == Some(session),
                robot.status == RobotStatus::Error,
            )
        };
        if held {
            return Ok(());
        }
        if !faulted {
            tracing::info!(%robot_id, user_id = %session.controller_id, "session ended while connecting, closing link");
            self.connections.disconnect(robot_id).await;
        }
        Err(GatewayError::NotAvailable {
            robot_id,
            reason: "session ended while connecting".to_string(),
        })
    }

    /// Forwards a command from the current holder.
    ///
    /// The holder check and the send happen under the robot's read lock, so
    /// a session cannot end between them. `emergency_stop` additionally runs
    /// the emergency-stop transition.
    ///
    /// # Errors
    ///
    /// [`GatewayError::AccessDenied`] below `control`,
    /// [`GatewayError::NotHolder`] for anyone but the holder, or the
    /// registry's send error.
    pub async fn send_command(
        &self,
        robot_id: RobotId,
        user_id: UserId,
        kind: CommandKind,
    ) -> Result<CommandReceipt, GatewayError> {
        let command = Command::new(kind);
        let lock = self.robots.get(robot_id).await?;

        if command.kind().is_emergency_stop() {
            {
                let robot = lock.read().await;
                require_holder(&robot, user_id)?;
            }
            self.force_emergency_stop(robot_id, user_id).await?;
            return Ok(receipt(robot_id, &command, VelocityVector::ZERO));
        }

        let velocity = {
            let robot = lock.read().await;
            require_holder(&robot, user_id)?;
            self.connections.send(robot_id, &command).await?
        };

        let _ = self.event_bus.publish(RobotEvent::CommandAcknowledged {
            robot_id,
            controller_id: user_id,
            command: command.clone(),
            velocity,
            timestamp: Utc::now(),
        });
        Ok(receipt(robot_id, &command, velocity))
    }

    /// Ends the caller's session: best-effort stop, disconnect, release.
    ///
    /// # Errors
    ///
    /// [`GatewayError::AccessDenied`] below `control`, so the holder is
    /// never revealed to strangers; [`GatewayError::NotHolder`] when the
    /// caller does not hold the session (including when there is none).
    pub async fn end_session(
        &self,
        robot_id: RobotId,
        user_id: UserId,
    ) -> Result<ControlSession, GatewayError> {
        {
            let lock = self.robots.get(robot_id).await?;
            let robot = lock.read().await;
            require_holder(&robot, user_id)?;
        }
        self.release(robot_id, user_id, SessionEndReason::Released)
            .await?
            .ok_or(GatewayError::NotHolder {
                robot_id,
                holder: None,
            })
    }

    /// Ends the session of a controller whose transport closed. Identical
    /// to [`SessionAuthority::end_session`], but a no-op when `user_id` no
    /// longer holds the robot.
    pub async fn release_on_disconnect(&self, robot_id: RobotId, user_id: UserId) -> Option<ControlSession> {
        match self
            .release(robot_id, user_id, SessionEndReason::ControllerDisconnected)
            .await
        {
            Ok(ended) => ended,
            Err(e) => {
                tracing::debug!(%robot_id, %user_id, error = %e, "disconnect release skipped");
                None
            }
        }
    }

    async fn release(
        &self,
        robot_id: RobotId,
        user_id: UserId,
        reason: SessionEndReason,
    ) -> Result<Option<ControlSession>, GatewayError> {
        let lock = self.robots.get(robot_id).await?;
        if !lock.read().await.is_held_by(user_id) {
            return Ok(None);
        }

        match self.connections.send(robot_id, &Command::stop()).await {
            Ok(_) => {}
            Err(GatewayError::NotConnected(_)) => {}
            Err(e) => tracing::warn!(%robot_id, %user_id, error = %e, "stop before session end failed"),
        }
        self.connections.disconnect(robot_id).await;

        let ended = {
            let mut robot = lock.write().await;
            if robot.is_held_by(user_id) {
                robot.current_session.take()
            } else {
                None
            }
        };
        if let Some(session) = &ended {
            tracing::info!(%robot_id, %user_id, ?reason, "session ended");
            let _ = self.event_bus.publish(RobotEvent::SessionEnded {
                robot_id,
                controller_id: session.controller_id,
                reason,
                timestamp: Utc::now(),
            });
        }
        Ok(ended)
    }

    // ── Emergency stop ──────────────────────────────────────────────────

    /// Emergency-stops one robot. Requires fleet admin or robot admin.
    ///
    /// # Errors
    ///
    /// [`GatewayError::AccessDenied`], [`GatewayError::RobotNotFound`], or
    /// the send error (the robot is faulted either way).
    pub async fn emergency_stop(&self, robot_id: RobotId, operator: Operator) -> Result<(), GatewayError> {
        {
            let lock = self.robots.get(robot_id).await?;
            let robot = lock.read().await;
            require_robot_admin(&robot, operator)?;
        }
        self.force_emergency_stop(robot_id, operator.user_id).await
    }

    /// Faults the robot, clears any session, then sends `emergency_stop`.
    ///
    /// The state change happens first so a failed send still leaves the
    /// robot faulted. The link stays open for monitoring.
    pub(crate) async fn force_emergency_stop(
        &self,
        robot_id: RobotId,
        executed_by: UserId,
    ) -> Result<(), GatewayError> {
        let lock = self.robots.get(robot_id).await?;
        let (ended, status_changed) = {
            let mut robot = lock.write().await;
            let ended = robot.current_session.take();
            let changed = robot.set_status(RobotStatus::Error);
            (ended, changed)
        };

        tracing::warn!(%robot_id, user_id = %executed_by, "emergency stop");
        let now = Utc::now();
        if let Some(session) = ended {
            let _ = self.event_bus.publish(RobotEvent::SessionEnded {
                robot_id,
                controller_id: session.controller_id,
                reason: SessionEndReason::EmergencyStop,
                timestamp: now,
            });
        }
        if status_changed {
            let _ = self.event_bus.publish(RobotEvent::StatusChanged {
                robot_id,
                status: RobotStatus::Error,
                timestamp: now,
            });
        }

        let command = Command::emergency_stop();
        match self.connections.send(robot_id, &command).await {
            Ok(velocity) => {
                let _ = self.event_bus.publish(RobotEvent::CommandAcknowledged {
                    robot_id,
                    controller_id: executed_by,
                    command,
                    velocity,
                    timestamp: Utc::now(),
                });
                Ok(())
            }
            Err(e) => {
                tracing::error!(%robot_id, error = %e, "emergency stop send failed");
                Err(e)
            }
        }
    }

    /// Robots currently in a held session, in registration order.
    pub async fn held_robots(&self) -> Vec<RobotId> {
        let mut held = Vec::new();
        for lock in self.robots.entries().await {
            let robot = lock.read().await;
            if robot.current_session.is_some() {
                held.push(robot.id);
            }
        }
        held
    }

    // ── Administration ──────────────────────────────────────────────────

    /// Grants (or updates) `target`'s access level. Requires robot admin.
    ///
    /// # Errors
    ///
    /// [`GatewayError::AccessDenied`] or [`GatewayError::RobotNotFound`].
    pub async fn grant_access(
        &self,
        robot_id: RobotId,
        granter: UserId,
        target: UserId,
        level: AccessLevel,
    ) -> Result<AccessPermission, GatewayError> {
        let lock = self.robots.get(robot_id).await?;
        let mut robot = lock.write().await;
        require_level(&robot, granter, AccessLevel::Admin)?;
        let permission = AccessPermission {
            user_id: target,
            level,
            granted_by: granter,
            granted_at: Utc::now(),
        };
        robot.access_permissions.upsert(permission.clone());
        tracing::info!(%robot_id, user_id = %target, %level, granted_by = %granter, "access granted");
        Ok(permission)
    }

    /// Revokes `target`'s grant. Revoking the owner is a no-op. Returns
    /// whether an entry was removed.
    ///
    /// # Errors
    ///
    /// [`GatewayError::AccessDenied`] or [`GatewayError::RobotNotFound`].
    pub async fn revoke_access(
        &self,
        robot_id: RobotId,
        revoker: UserId,
        target: UserId,
    ) -> Result<bool, GatewayError> {
        let lock = self.robots.get(robot_id).await?;
        let mut robot = lock.write().await;
        require_level(&robot, revoker, AccessLevel::Admin)?;
        if target == robot.owner {
            return Ok(false);
        }
        let removed = robot.access_permissions.remove(target);
        if removed {
            tracing::info!(%robot_id, user_id = %target, revoked_by = %revoker, "access revoked");
        }
        Ok(removed)
    }

    /// Clears a fault: `error` → `online` if still connected, else
    /// `offline`. A robot that is not faulted is left as is.
    ///
    /// # Errors
    ///
    /// [`GatewayError::AccessDenied`] or [`GatewayError::RobotNotFound`].
    pub async fn clear_fault(&self, robot_id: RobotId, operator: Operator) -> Result<RobotStatus, GatewayError> {
        let lock = self.robots.get(robot_id).await?;
        {
            let robot = lock.read().await;
            require_robot_admin(&robot, operator)?;
            if robot.status != RobotStatus::Error {
                return Ok(robot.status);
            }
        }
        let next = if self.connections.is_connected(robot_id).await {
            RobotStatus::Online
        } else {
            RobotStatus::Offline
        };
        let changed = {
            let mut robot = lock.write().await;
            robot.status == RobotStatus::Error && robot.set_status(next)
        };
        if changed {
            tracing::info!(%robot_id, user_id = %operator.user_id, status = %next, "fault cleared");
            let _ = self.event_bus.publish(RobotEvent::StatusChanged {
                robot_id,
                status: next,
                timestamp: Utc::now(),
            });
        }
        let status = lock.read().await.status;
        Ok(status)
    }

    /// Enters or leaves maintenance.
    ///
    /// # Errors
    ///
    /// [`GatewayError::AccessDenied`], [`GatewayError::RobotNotFound`],
    /// [`GatewayError::NotAvailable`] when entering maintenance while a
    /// session is held, or [`GatewayError::InvalidRequest`] on a faulted
    /// robot.
    pub async fn set_maintenance(
        &self,
        robot_id: RobotId,
        operator: Operator,
        enabled: bool,
    ) -> Result<RobotStatus, GatewayError> {
        let lock = self.robots.get(robot_id).await?;
        let connected = self.connections.is_connected(robot_id).await;
        let (status, changed) = {
            let mut robot = lock.write().await;
            require_robot_admin(&robot, operator)?;
            if robot.status == RobotStatus::Error {
                return Err(GatewayError::InvalidRequest(
                    "robot is faulted; clear the fault first".to_string(),
                ));
            }
            let next = match (enabled, robot.status) {
                (true, _) => {
                    if let Some(holder) = robot.holder() {
                        return Err(GatewayError::NotAvailable {
                            robot_id,
                            reason: format!("robot is controlled by {holder}"),
                        });
                    }
                    RobotStatus::Maintenance
                }
                (false, RobotStatus::Maintenance) if connected => RobotStatus::Online,
                (false, RobotStatus::Maintenance) => RobotStatus::Offline,
                (false, current) => current,
            };
            let changed = robot.set_status(next);
            (next, changed)
        };
        if changed {
            tracing::info!(%robot_id, user_id = %operator.user_id, %status, "maintenance toggled");
            let _ = self.event_bus.publish(RobotEvent::StatusChanged {
                robot_id,
                status,
                timestamp: Utc::now(),
            });
        }
        Ok(status)
    }

    // ── Connections ─────────────────────────────────────────────────────

    /// Opens the robot's link without a session (monitoring). Requires
    /// `control`.
    ///
    /// # Errors
    ///
    /// [`GatewayError::AccessDenied`] or the registry's connect error.
    pub async fn connect_robot(&self, robot_id: RobotId, user_id: UserId) -> Result<ConnectionStatus, GatewayError> {
        let communication = {
            let lock = self.robots.get(robot_id).await?;
            let robot = lock.read().await;
            require_level(&robot, user_id, AccessLevel::Control)?;
            robot.communication.clone()
        };
        self.connections.connect(robot_id, &communication).await
    }

    /// Closes the robot's link. Requires `control`; refused while another
    /// user holds the session. Returns whether a link was closed.
    ///
    /// # Errors
    ///
    /// [`GatewayError::AccessDenied`] or [`GatewayError::NotHolder`].
    pub async fn disconnect_robot(&self, robot_id: RobotId, user_id: UserId) -> Result<bool, GatewayError> {
        {
            let lock = self.robots.get(robot_id).await?;
            let robot = lock.read().await;
            require_level(&robot, user_id, AccessLevel::Control)?;
            if let Some(holder) = robot.holder()
                && holder != user_id
            {
                return Err(GatewayError::NotHolder {
                    robot_id,
                    holder: Some(holder),
                });
            }
        }
        Ok(self.connections.disconnect(robot_id).await)
    }

    /// Returns the connection status. Requires `view`.
    ///
    /// # Errors
    ///
    /// [`GatewayError::AccessDenied`] or [`GatewayError::RobotNotFound`].
    pub async fn connection_status(&self, robot_id: RobotId, user_id: UserId) -> Result<ConnectionStatus, GatewayError> {
        {
            let lock = self.robots.get(robot_id).await?;
            let robot = lock.read().await;
            require_level(&robot, user_id, AccessLevel::View)?;
        }
        Ok(self.connections.status(robot_id).await)
    }

    // ── Queries ─────────────────────────────────────────────────────────

    /// Returns the session state. Requires `view`.
    ///
    /// # Errors
    ///
    /// [`GatewayError::AccessDenied`] or [`GatewayError::RobotNotFound`].
    pub async fn session_state(&self, robot_id: RobotId, user_id: UserId) -> Result<SessionState, GatewayError> {
        let lock = self.robots.get(robot_id).await?;
        let robot = lock.read().await;
        require_level(&robot, user_id, AccessLevel::View)?;
        Ok(robot.session_state())
    }

    /// Returns the full robot view. Requires `view` (fleet admins always
    /// qualify).
    ///
    /// # Errors
    ///
    /// [`GatewayError::AccessDenied`] or [`GatewayError::RobotNotFound`].
    pub async fn robot_view(&self, robot_id: RobotId, operator: Operator) -> Result<RobotView, GatewayError> {
        let snapshot = self.robots.snapshot(robot_id).await?;
        let access_level = match snapshot.granted_level(operator.user_id) {
            Some(level) => level,
            None if operator.is_admin() => AccessLevel::Admin,
            None => {
                return Err(GatewayError::AccessDenied(format!(
                    "view access to robot {robot_id} required"
                )));
            }
        };
        let connection = self.connections.status(robot_id).await;
        Ok(RobotView {
            summary: RobotSummary::from(&snapshot),
            session: snapshot.session_state(),
            telemetry: snapshot.telemetry.clone(),
            last_heartbeat: snapshot.last_heartbeat,
            connection,
            access_level,
            access_permissions: snapshot.access_permissions.iter().cloned().collect(),
        })
    }
}

fn receipt(robot_id: RobotId, command: &Command, velocity: VelocityVector) -> CommandReceipt {
    CommandReceipt {
        robot_id,
        command_type: command.kind().type_str().to_string(),
        velocity,
        issued_at: command.timestamp(),
    }
}

fn require_level(robot: &Robot, user_id: UserId, required: AccessLevel) -> Result<(), GatewayError> {
    if robot.authorize(user_id, required) {
        Ok(())
    } else {
        Err(GatewayError::AccessDenied(format!(
            "{required} access to robot {} required",
            robot.id
        )))
    }
}

fn require_robot_admin(robot: &Robot, operator: Operator) -> Result<(), GatewayError> {
    if operator.is_admin() {
        return Ok(());
    }
    require_level(robot, operator.user_id, AccessLevel::Admin)
}

fn require_holder(robot: &Robot, user_id: UserId) -> Result<(), GatewayError> {
    require_level(robot, user_id, AccessLevel::Control)?;
    if robot.is_held_by(user_id) {
        Ok(())
    } else {
        Err(GatewayError::NotHolder {
            robot_id: robot.id,
            holder: robot.holder(),
        })
    }
}
