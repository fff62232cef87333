//! Recording adapter for unit tests.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{InboundSink, ProtocolAdapter, RobotLink};
use crate::domain::{CommunicationConfig, ProtocolKind, RobotId, VelocityVector};
use crate::error::GatewayError;

/// Shared record of everything the mock saw.
#[derive(Debug, Default)]
pub(crate) struct Recorder {
    pub(crate) sent: Mutex<Vec<(RobotId, VelocityVector)>>,
    pub(crate) connects: AtomicUsize,
    pub(crate) disconnects: AtomicUsize,
    pub(crate) sinks: Mutex<Vec<(RobotId, InboundSink)>>,
}

impl Recorder {
    pub(crate) async fn sent_to(&self, robot_id: RobotId) -> Vec<VelocityVector> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|(id, _)| *id == robot_id)
            .map(|(_, v)| *v)
            .collect()
    }

    pub(crate) async fn sink_for(&self, robot_id: RobotId) -> Option<InboundSink> {
        self.sinks
            .lock()
            .await
            .iter()
            .rev()
            .find(|(id, _)| *id == robot_id)
            .map(|(_, s)| s.clone())
    }

    /// Drops every inbound sink for `robot_id`, as a link whose reader died.
    pub(crate) async fn sever(&self, robot_id: RobotId) {
        self.sinks.lock().await.retain(|(id, _)| *id != robot_id);
    }
}

#[derive(Debug)]
pub(crate) struct MockAdapter {
    kind: ProtocolKind,
    pub(crate) recorder: Arc<Recorder>,
    fail_connect: bool,
    failing_sends: HashSet<RobotId>,
    connect_delay: Duration,
    send_delay: Duration,
}

impl MockAdapter {
    pub(crate) fn new(kind: ProtocolKind) -> Self {
        Self {
            kind,
            recorder: Arc::new(Recorder::default()),
            fail_connect: false,
            failing_sends: HashSet::new(),
            connect_delay: Duration::ZERO,
            send_delay: Duration::ZERO,
        }
    }

    pub(crate) fn failing_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub(crate) fn failing_sends_for(mut self, robot_id: RobotId) -> Self {
        self.failing_sends.insert(robot_id);
        self
    }

    pub(crate) fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = delay;
        self
    }

    pub(crate) fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }
}

#[async_trait]
impl ProtocolAdapter for MockAdapter {
    fn kind(&self) -> ProtocolKind {
        self.kind
    }

    async fn connect(
        &self,
        robot_id: RobotId,
        _communication: &CommunicationConfig,
        inbound: InboundSink,
    ) -> Result<Box<dyn RobotLink>, GatewayError> {
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }
        if self.fail_connect {
            return Err(GatewayError::ConnectFailed {
                protocol: self.kind,
                reason: "mock refused".to_string(),
            });
        }
        self.recorder.connects.fetch_add(1, Ordering::SeqCst);
        self.recorder.sinks.lock().await.push((robot_id, inbound));
        Ok(Box::new(MockLink {
            robot_id,
            recorder: Arc::clone(&self.recorder),
            fail_sends: self.failing_sends.contains(&robot_id),
            send_delay: self.send_delay,
            alive: AtomicBool::new(true),
        }))
    }
}

#[derive(Debug)]
struct MockLink {
    robot_id: RobotId,
    recorder: Arc<Recorder>,
    fail_sends: bool,
    send_delay: Duration,
    alive: AtomicBool,
}

#[async_trait]
impl RobotLink for MockLink {
    async fn publish_command(&self, velocity: &VelocityVector) -> Result<(), GatewayError> {
        if !self.send_delay.is_zero() {
            tokio::time::sleep(self.send_delay).await;
        }
        if self.fail_sends {
            return Err(GatewayError::SendFailure("mock send failure".to_string()));
        }
        self.recorder.sent.lock().await.push((self.robot_id, *velocity));
        Ok(())
    }

    async fn subscribe_status(&self) -> Result<(), GatewayError> {
        Ok(())
    }

    async fn subscribe_telemetry(&self) -> Result<(), GatewayError> {
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) -> Result<(), GatewayError> {
        self.alive.store(false, Ordering::SeqCst);
        self.recorder.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
