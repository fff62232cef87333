//! Broadcast channel for robot events.
//!
//! [`EventBus`] wraps a [`tokio::sync::broadcast`] channel. Every control
//! plane mutation and inbound robot message publishes a [`RobotEvent`]
//! through the bus; WebSocket observers and [`RobotSubscription`]s receive
//! them. Dropping a receiver is the only release step a subscriber needs.

use std::collections::HashSet;

use tokio::sync::broadcast;

use super::RobotId;
use super::robot_event::{EventTopic, RobotEvent};

/// Broadcast bus for [`RobotEvent`]s.
///
/// Backed by a `tokio::broadcast` channel with a configurable capacity
/// (default 10 000). When the ring buffer is full, the oldest events are
/// dropped for lagging receivers; fan-out is best-effort, not a log.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<RobotEvent>,
}

impl EventBus {
    /// Creates a new `EventBus` with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of receivers that received the event.
    /// If there are no active receivers, the event is silently dropped.
    pub fn publish(&self, event: RobotEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Creates a new receiver that will receive all future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RobotEvent> {
        self.sender.subscribe()
    }

    /// Subscribes to one robot, optionally narrowed to some topics.
    ///
    /// An empty `topics` slice means every topic.
    #[must_use]
    pub fn subscribe_robot(&self, robot_id: RobotId, topics: &[EventTopic]) -> RobotSubscription {
        RobotSubscription {
            robot_id,
            topics: topics.iter().copied().collect(),
            receiver: self.sender.subscribe(),
        }
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Receiver filtered to a single robot and a set of topics.
#[derive(Debug)]
pub struct RobotSubscription {
    robot_id: RobotId,
    topics: HashSet<EventTopic>,
    receiver: broadcast::Receiver<RobotEvent>,
}

impl RobotSubscription {
    /// Returns the observed robot.
    #[must_use]
    pub const fn robot_id(&self) -> RobotId {
        self.robot_id
    }

    /// Returns `true` when `event` passes this subscription's filter.
    #[must_use]
    pub fn matches(&self, event: &RobotEvent) -> bool {
        event.robot_id() == self.robot_id
            && (self.topics.is_empty() || self.topics.contains(&event.topic()))
    }

    /// Waits for the next matching event.
    ///
    /// Lagged gaps are logged and skipped. Returns `None` once the bus is
    /// gone.
    pub async fn recv(&mut self) -> Option<RobotEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.matches(&event) => return Some(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(robot_id = %self.robot_id, lagged = n, "robot subscriber lagged behind event bus");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next already-queued matching event without waiting.
    pub fn try_recv(&mut self) -> Option<RobotEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.matches(&event) => return Some(event),
                Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(_) => return None,
            }
        }
    }
}
