//! Per-connection subscription manager.
//!
//! Tracks which robots and topics a WebSocket client follows and filters
//! bus events server-side.

use std::collections::HashSet;

use crate::domain::{EventTopic, RobotEvent, RobotId};

/// Manages the robot and topic subscriptions of a single WebSocket
/// connection.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    /// Subscribed robots. Ignored while `subscribe_all` is set.
    robot_ids: HashSet<RobotId>,
    /// Wildcard `"*"`.
    subscribe_all: bool,
    /// Topic filter; empty means every topic.
    topics: HashSet<EventTopic>,
}

impl SubscriptionManager {
    /// Creates an empty manager that matches nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds robots (and optionally the wildcard) and widens the topic
    /// filter with `topics`.
    pub fn subscribe(&mut self, ids: &[RobotId], wildcard: bool, topics: &[EventTopic]) {
        if wildcard {
            self.subscribe_all = true;
        }
        self.robot_ids.extend(ids.iter().copied());
        self.topics.extend(topics.iter().copied());
    }

    /// Removes robots. `wildcard` drops the `"*"` subscription.
    pub fn unsubscribe(&mut self, ids: &[RobotId], wildcard: bool) {
        if wildcard {
            self.subscribe_all = false;
        }
        for id in ids {
            self.robot_ids.remove(id);
        }
    }

    /// Returns `true` if `event` passes both the robot and topic filters.
    #[must_use]
    pub fn matches(&self, event: &RobotEvent) -> bool {
        let robot_ok = self.subscribe_all || self.robot_ids.contains(&event.robot_id());
        robot_ok && (self.topics.is_empty() || self.topics.contains(&event.topic()))
    }

    /// Number of explicitly subscribed robots.
    #[must_use]
    pub fn count(&self) -> usize {
        self.robot_ids.len()
    }

    /// Returns `true` if the wildcard subscription is active.
    #[must_use]
    pub const fn is_subscribed_all(&self) -> bool {
        self.subscribe_all
    }

    /// Active topic filter, sorted by name.
    #[must_use]
    pub fn topics(&self) -> Vec<EventTopic> {
        let mut topics: Vec<EventTopic> = self.topics.iter().copied().collect();
        topics.sort_by_key(EventTopic::as_str);
        topics
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::RobotStatus;

    fn status(robot_id: RobotId) -> RobotEvent {
        RobotEvent::StatusChanged {
            robot_id,
            status: RobotStatus::Online,
            timestamp: Utc::now(),
        }
    }

    fn heartbeat(robot_id: RobotId) -> RobotEvent {
        RobotEvent::Heartbeat {
            robot_id,
            timestamp: Utc::now(),
        }
    }

    fn telemetry(robot_id: RobotId) -> RobotEvent {
        RobotEvent::Telemetry {
            robot_id,
            payload: serde_json::json!({"battery": 80}),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn empty_matches_nothing() {
        let mgr = SubscriptionManager::new();
        assert!(!mgr.matches(&status(RobotId::new())));
    }

    #[test]
    fn subscribe_specific_robot() {
        let mut mgr = SubscriptionManager::new();
        let id = RobotId::new();
        mgr.subscribe(&[id], false, &[]);
        assert!(mgr.matches(&status(id)));
        assert!(mgr.matches(&telemetry(id)));
        assert!(!mgr.matches(&status(RobotId::new())));
    }

    #[test]
    fn topic_filter_narrows_events() {
        let mut mgr = SubscriptionManager::new();
        let id = RobotId::new();
        mgr.subscribe(&[id], false, &[EventTopic::Telemetry]);
        assert!(mgr.matches(&telemetry(id)));
        assert!(!mgr.matches(&status(id)));
        assert!(!mgr.matches(&heartbeat(id)));
        assert_eq!(mgr.topics(), vec![EventTopic::Telemetry]);
    }

    #[test]
    fn wildcard_matches_every_robot() {
        let mut mgr = SubscriptionManager::new();
        mgr.subscribe(&[], true, &[]);
        assert!(mgr.matches(&status(RobotId::new())));
        mgr.unsubscribe(&[], true);
        assert!(!mgr.matches(&status(RobotId::new())));
    }

    #[test]
    fn unsubscribe_removes_robot() {
        let mut mgr = SubscriptionManager::new();
        let id = RobotId::new();
        mgr.subscribe(&[id, RobotId::new()], false, &[]);
        assert_eq!(mgr.count(), 2);
        mgr.unsubscribe(&[id], false);
        assert!(!mgr.matches(&status(id)));
        assert_eq!(mgr.count(), 1);
    }
}
