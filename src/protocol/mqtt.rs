//! MQTT adapter over `rumqttc`.
//!
//! Each robot gets its own client session on the configured broker. The
//! event loop runs in a poller task that also decodes inbound publishes.
//! Broker errors are retried with bounded exponential backoff; after
//! [`ReconnectPolicy::max_attempts`] consecutive failures the link reports
//! itself dead and the poller stops.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use serde_json::json;
use tokio::task::JoinHandle;

use super::{InboundKind, InboundMessage, InboundSink, ProtocolAdapter, RobotLink, decode_payload};
use crate::config::{TransportConfig, millis};
use crate::domain::{CommunicationConfig, ProtocolKind, ResolvedTopics, RobotId, VelocityVector};
use crate::error::GatewayError;

const REQUEST_QUEUE: usize = 64;
const DEFAULT_PORT: u16 = 1883;

/// Bounded reconnect schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay after the first failure.
    pub base: Duration,
    /// Delay ceiling.
    pub max: Duration,
    /// Consecutive failures tolerated before giving up.
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    /// Reads the policy from the transport configuration.
    #[must_use]
    pub const fn from_config(config: &TransportConfig) -> Self {
        Self {
            base: config.mqtt_reconnect_base,
            max: config.mqtt_reconnect_max,
            max_attempts: config.mqtt_max_reconnect_attempts,
        }
    }

    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`,
    /// capped at `max`.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&TransportConfig::default())
    }
}

/// Splits `mqtt://host:port`, `tcp://host:port`, `host:port`, or `host`.
///
/// # Errors
///
/// Returns a description when the host is empty or the port is invalid.
pub fn parse_broker_url(url: &str) -> Result<(String, u16), String> {
    let rest = url
        .trim()
        .trim_start_matches("mqtt://")
        .trim_start_matches("tcp://");
    let rest = rest.split('/').next().unwrap_or_default();
    let (host, port) = match rest.rsplit_once(':') {
        Some((host, port)) => (
            host,
            port.parse::<u16>()
                .map_err(|e| format!("invalid MQTT broker port in {url}: {e}"))?,
        ),
        None => (rest, DEFAULT_PORT),
    };
    if host.is_empty() {
        return Err(format!("invalid MQTT broker URL: {url}"));
    }
    Ok((host.to_string(), port))
}

/// Adapter for robots reachable through the MQTT broker.
#[derive(Debug, Clone)]
pub struct MqttAdapter {
    host: String,
    port: u16,
    policy: ReconnectPolicy,
    keepalive: Duration,
}

impl MqttAdapter {
    /// Creates an adapter for the broker at `url` with default policy.
    ///
    /// # Errors
    ///
    /// Returns a description when the URL cannot be parsed.
    pub fn from_broker_url(url: &str) -> Result<Self, String> {
        let (host, port) = parse_broker_url(url)?;
        Ok(Self {
            host,
            port,
            policy: ReconnectPolicy::default(),
            keepalive: Duration::from_secs(15),
        })
    }

    /// Replaces the reconnect policy and the broker keep-alive.
    #[must_use]
    pub const fn with_policy(mut self, policy: ReconnectPolicy, keepalive: Duration) -> Self {
        self.policy = policy;
        self.keepalive = keepalive;
        self
    }
}

#[async_trait]
impl ProtocolAdapter for MqttAdapter {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Mqtt
    }

    async fn connect(
        &self,
        robot_id: RobotId,
        communication: &CommunicationConfig,
        inbound: InboundSink,
    ) -> Result<Box<dyn RobotLink>, GatewayError> {
        let mut options = MqttOptions::new(format!("teleop-{robot_id}"), &self.host, self.port);
        options.set_keep_alive(self.keepalive.max(Duration::from_secs(5)));
        options.set_clean_session(false);

        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_QUEUE);
        wait_for_connack(&mut eventloop).await?;

        let topics = communication.topics_for(&robot_id.to_string());
        let alive = Arc::new(AtomicBool::new(true));
        let poller = tokio::spawn(poll_loop(
            eventloop,
            robot_id,
            topics.clone(),
            inbound,
            self.policy,
            Arc::clone(&alive),
        ));
        tracing::debug!(%robot_id, host = %self.host, port = self.port, "mqtt session open");

        Ok(Box::new(MqttLink {
            client,
            topics,
            alive,
            poller,
        }))
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<(), GatewayError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
            Ok(_) => {}
            Err(e) => {
                return Err(GatewayError::ConnectFailed {
                    protocol: ProtocolKind::Mqtt,
                    reason: e.to_string(),
                });
            }
        }
    }
}

async fn poll_loop(
    mut eventloop: EventLoop,
    robot_id: RobotId,
    topics: ResolvedTopics,
    inbound: InboundSink,
    policy: ReconnectPolicy,
    alive: Arc<AtomicBool>,
) {
    let mut failures: u32 = 0;
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                failures = 0;
                alive.store(true, Ordering::SeqCst);
                let Some(kind) = InboundKind::for_topic(&topics, &publish.topic) else {
                    continue;
                };
                let message = InboundMessage::new(robot_id, kind, decode_payload(&publish.payload));
                if inbound.send(message).await.is_err() {
                    tracing::debug!(%robot_id, "mqtt inbound receiver dropped");
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
            Ok(_) => {
                failures = 0;
                alive.store(true, Ordering::SeqCst);
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                alive.store(false, Ordering::SeqCst);
                if failures > policy.max_attempts {
                    tracing::warn!(%robot_id, attempts = failures, error = %e, "mqtt reconnect attempts exhausted");
                    break;
                }
                let delay = policy.delay(failures);
                tracing::warn!(%robot_id, attempt = failures, delay_ms = millis(delay), error = %e, "mqtt connection lost, retrying");
                tokio::time::sleep(delay).await;
            }
        }
    }
    alive.store(false, Ordering::SeqCst);
}

#[derive(Debug)]
struct MqttLink {
    client: AsyncClient,
    topics: ResolvedTopics,
    alive: Arc<AtomicBool>,
    poller: JoinHandle<()>,
}

impl MqttLink {
    async fn subscribe_to(&self, topic: &str) -> Result<(), GatewayError> {
        self.client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| GatewayError::SendFailure(format!("mqtt subscribe {topic}: {e}")))
    }
}

#[async_trait]
impl RobotLink for MqttLink {
    async fn publish_command(&self, velocity: &VelocityVector) -> Result<(), GatewayError> {
        if !self.is_alive() {
            return Err(GatewayError::SendFailure(
                "mqtt broker connection is down".to_string(),
            ));
        }
        let body = json!({
            "linear": velocity.linear,
            "angular": velocity.angular,
            "timestamp": Utc::now(),
        });
        let payload =
            serde_json::to_vec(&body).map_err(|e| GatewayError::Internal(e.to_string()))?;
        self.client
            .publish(self.topics.command.as_str(), QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| GatewayError::SendFailure(format!("mqtt publish: {e}")))
    }

    async fn subscribe_status(&self) -> Result<(), GatewayError> {
        self.subscribe_to(&self.topics.status).await?;
        self.subscribe_to(&self.topics.heartbeat).await
    }

    async fn subscribe_telemetry(&self) -> Result<(), GatewayError> {
        self.subscribe_to(&self.topics.telemetry).await
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst) && !self.poller.is_finished()
    }

    async fn disconnect(&self) -> Result<(), GatewayError> {
        if self.is_alive() {
            for topic in [&self.topics.status, &self.topics.heartbeat, &self.topics.telemetry] {
                if let Err(e) = self.client.unsubscribe(topic.as_str()).await {
                    tracing::debug!(topic = %topic, error = %e, "mqtt unsubscribe failed");
                }
            }
            if let Err(e) = self.client.disconnect().await {
                tracing::debug!(error = %e, "mqtt disconnect request failed");
            }
        }
        self.alive.store(false, Ordering::SeqCst);
        self.poller.abort();
        Ok(())
    }
}

impl Drop for MqttLink {
    fn drop(&mut self) {
        self.poller.abort();
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = ReconnectPolicy {
            base: Duration::from_millis(100),
            max: Duration::from_millis(1_000),
            max_attempts: 5,
        };
        assert_eq!(policy.delay(1), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(200));
        assert_eq!(policy.delay(4), Duration::from_millis(800));
        assert_eq!(policy.delay(5), Duration::from_millis(1_000));
        assert_eq!(policy.delay(60), Duration::from_millis(1_000));
    }

    #[test]
    fn broker_url_forms() {
        assert_eq!(
            parse_broker_url("mqtt://broker.local:1884"),
            Ok(("broker.local".to_string(), 1884))
        );
        assert_eq!(
            parse_broker_url("tcp://10.1.1.1"),
            Ok(("10.1.1.1".to_string(), 1883))
        );
        assert_eq!(parse_broker_url("broker"), Ok(("broker".to_string(), 1883)));
        assert!(parse_broker_url("mqtt://:1883").is_err());
        assert!(parse_broker_url("broker:notaport").is_err());
    }

    #[test]
    fn adapter_from_url_keeps_policy_override() {
        let Ok(adapter) = MqttAdapter::from_broker_url("mqtt://b:1883") else {
            panic!("valid url");
        };
        let policy = ReconnectPolicy {
            base: Duration::from_millis(1),
            max: Duration::from_millis(2),
            max_attempts: 1,
        };
        let adapter = adapter.with_policy(policy, Duration::from_secs(30));
        assert_eq!(adapter.policy, policy);
        assert_eq!(adapter.kind(), ProtocolKind::Mqtt);
    }

    #[test]
    fn mqtt_topics_are_namespaced() {
        let comm = CommunicationConfig::new(ProtocolKind::Mqtt, "");
        let topics = comm.topics_for("r9");
        assert_eq!(topics.command, "robots/r9/cmd_vel");
        assert_eq!(
            InboundKind::for_topic(&topics, "robots/r9/telemetry"),
            Some(InboundKind::Telemetry)
        );
    }
}
