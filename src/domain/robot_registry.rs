//! Concurrent robot storage with per-robot fine-grained locking.
//!
//! [`RobotRegistry`] stores every registered robot in a `HashMap` where each
//! entry is individually protected by a [`tokio::sync::RwLock`]. Mutations
//! of the same robot are linearized by that lock; different robots never
//! block each other.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;

use super::RobotId;
use super::robot::{Robot, RobotDescriptor, RobotSummary};
use crate::error::GatewayError;

#[derive(Debug)]
struct Slot {
    seq: u64,
    robot: Arc<RwLock<Robot>>,
}

/// Central store for all registered robots.
///
/// # Concurrency
///
/// - Multiple tasks may read the same robot concurrently.
/// - Writes to different robots are concurrent.
/// - Writes to the same robot are serialized.
#[derive(Debug)]
pub struct RobotRegistry {
    robots: RwLock<HashMap<RobotId, Slot>>,
    next_seq: AtomicU64,
}

impl RobotRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            robots: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Registers a robot from its descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] if the name is blank or a
    /// robot with the same ID already exists.
    pub async fn register(&self, descriptor: RobotDescriptor) -> Result<RobotId, GatewayError> {
        if descriptor.name.trim().is_empty() {
            return Err(GatewayError::InvalidRequest(
                "robot name must not be empty".to_string(),
            ));
        }
        let robot = Robot::from_descriptor(descriptor);
        let robot_id = robot.id;
        let mut map = self.robots.write().await;
        if map.contains_key(&robot_id) {
            return Err(GatewayError::InvalidRequest(format!(
                "robot {robot_id} already exists"
            )));
        }
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        map.insert(
            robot_id,
            Slot {
                seq,
                robot: Arc::new(RwLock::new(robot)),
            },
        );
        Ok(robot_id)
    }

    /// Returns the robot behind its per-robot lock.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::RobotNotFound`] if no robot with the given ID
    /// exists.
    pub async fn get(&self, robot_id: RobotId) -> Result<Arc<RwLock<Robot>>, GatewayError> {
        let map = self.robots.read().await;
        map.get(&robot_id)
            .map(|slot| Arc::clone(&slot.robot))
            .ok_or(GatewayError::RobotNotFound(robot_id))
    }

    /// Returns a point-in-time copy of the robot.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::RobotNotFound`] if the robot is unknown.
    pub async fn snapshot(&self, robot_id: RobotId) -> Result<Robot, GatewayError> {
        let lock = self.get(robot_id).await?;
        let robot = lock.read().await;
        Ok(robot.clone())
    }

    /// Soft-retires a robot once `check` accepts it. Retired robots refuse
    /// new sessions and are hidden from [`RobotRegistry::list_where`]; their
    /// record is kept. `check` runs under the robot's write lock.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::RobotNotFound`] if the robot is unknown, or
    /// whatever `check` rejects with.
    pub async fn retire<F>(&self, robot_id: RobotId, check: F) -> Result<(), GatewayError>
    where
        F: FnOnce(&Robot) -> Result<(), GatewayError>,
    {
        let lock = self.get(robot_id).await?;
        let mut robot = lock.write().await;
        check(&robot)?;
        robot.retired = true;
        Ok(())
    }

    /// Returns every robot lock, retired ones included, in registration
    /// order.
    pub async fn entries(&self) -> Vec<Arc<RwLock<Robot>>> {
        let map = self.robots.read().await;
        let mut slots: Vec<&Slot> = map.values().collect();
        slots.sort_by_key(|slot| slot.seq);
        slots.iter().map(|slot| Arc::clone(&slot.robot)).collect()
    }

    /// Returns summaries of the non-retired robots accepted by `keep`, in
    /// registration order.
    pub async fn list_where<F>(&self, keep: F) -> Vec<RobotSummary>
    where
        F: Fn(&Robot) -> bool,
    {
        let entries = self.entries().await;
        let mut summaries = Vec::with_capacity(entries.len());
        for lock in entries {
            let robot = lock.read().await;
            if !robot.retired && keep(&robot) {
                summaries.push(RobotSummary::from(&*robot));
            }
        }
        summaries
    }

    /// Returns the number of registered robots, retired ones included.
    pub async fn len(&self) -> usize {
        self.robots.read().await.len()
    }

    /// Returns `true` if no robot has been registered.
    pub async fn is_empty(&self) -> bool {
        self.robots.read().await.is_empty()
    }
}

impl Default for RobotRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{AccessList, CommunicationConfig, ProtocolKind, RobotStatus, UserId};

    fn descriptor(name: &str) -> RobotDescriptor {
        RobotDescriptor {
            id: None,
            name: name.to_string(),
            owner: UserId::new(),
            communication: CommunicationConfig::new(ProtocolKind::Rosbridge, "10.0.0.9"),
            access_permissions: AccessList::new(),
            status: RobotStatus::Offline,
        }
    }

    #[tokio::test]
    async fn register_and_get() {
        let registry = RobotRegistry::new();
        let Ok(id) = registry.register(descriptor("arm")).await else {
            panic!("register failed");
        };
        let Ok(lock) = registry.get(id).await else {
            panic!("robot missing");
        };
        assert_eq!(lock.read().await.name, "arm");
    }

    #[tokio::test]
    async fn register_keeps_supplied_id() {
        let registry = RobotRegistry::new();
        let id = RobotId::new();
        let mut desc = descriptor("arm");
        desc.id = Some(id);
        assert!(matches!(registry.register(desc).await, Ok(got) if got == id));

        let mut dup = descriptor("arm-2");
        dup.id = Some(id);
        assert!(matches!(
            registry.register(dup).await,
            Err(GatewayError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn blank_name_is_rejected() {
        let registry = RobotRegistry::new();
        let result = registry.register(descriptor("  ")).await;
        assert!(matches!(result, Err(GatewayError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn get_unknown_returns_not_found() {
        let registry = RobotRegistry::new();
        let result = registry.get(RobotId::new()).await;
        assert!(matches!(result, Err(GatewayError::RobotNotFound(_))));
    }

    #[tokio::test]
    async fn list_preserves_registration_order() {
        let registry = RobotRegistry::new();
        let mut ids = Vec::new();
        for name in ["a", "b", "c", "d", "e"] {
            let Ok(id) = registry.register(descriptor(name)).await else {
                panic!("register failed");
            };
            ids.push(id);
        }
        let listed: Vec<RobotId> = registry.list_where(|_| true).await.iter().map(|s| s.robot_id).collect();
        assert_eq!(listed, ids);
    }

    #[tokio::test]
    async fn retired_robots_are_hidden_but_kept() {
        let registry = RobotRegistry::new();
        let Ok(id) = registry.register(descriptor("old")).await else {
            panic!("register failed");
        };
        assert!(registry.retire(id, |_| Ok(())).await.is_ok());

        assert!(registry.list_where(|_| true).await.is_empty());
        assert_eq!(registry.len().await, 1);
        let Ok(robot) = registry.snapshot(id).await else {
            panic!("retired robot must still be readable");
        };
        assert!(robot.retired);
    }

    #[tokio::test]
    async fn len_and_is_empty() {
        let registry = RobotRegistry::new();
        assert!(registry.is_empty().await);
        let _ = registry.register(descriptor("x")).await;
        assert!(!registry.is_empty().await);
        assert_eq!(registry.len().await, 1);
    }
}
