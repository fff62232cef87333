//! Per-robot access control.
//!
//! Access is an ordered capability tier: `view < control < admin`. A grant
//! at one level implies every level below it, and the robot's owner always
//! holds implicit `admin` access regardless of the permission list.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::UserId;

/// Ordered capability tier granted per user per robot.
///
/// The derived `Ord` follows declaration order, so `View < Control < Admin`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    /// Watch status and telemetry.
    View,
    /// Start sessions and drive the robot.
    Control,
    /// Manage permissions, clear faults, emergency-stop.
    Admin,
}

impl AccessLevel {
    /// Returns the level as a static string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Control => "control",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a robot's permission list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AccessPermission {
    /// User receiving the grant.
    pub user_id: UserId,
    /// Granted level.
    pub level: AccessLevel,
    /// User who issued the grant.
    pub granted_by: UserId,
    /// When the grant was issued or last updated.
    pub granted_at: DateTime<Utc>,
}

/// Ordered permission list, keyed by user id.
///
/// Granting an existing user updates the entry in place, so the list never
/// holds two entries for the same user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct AccessList(Vec<AccessPermission>);

impl AccessList {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a list from raw entries, keeping the last entry per user.
    #[must_use]
    pub fn from_entries(entries: Vec<AccessPermission>) -> Self {
        let mut list = Self::new();
        for entry in entries {
            list.upsert(entry);
        }
        list
    }

    /// Inserts or updates the entry for `permission.user_id`.
    pub fn upsert(&mut self, permission: AccessPermission) {
        match self.0.iter_mut().find(|p| p.user_id == permission.user_id) {
            Some(existing) => {
                existing.level = permission.level;
                existing.granted_by = permission.granted_by;
                existing.granted_at = permission.granted_at;
            }
            None => self.0.push(permission),
        }
    }

    /// Removes the entry for `user_id`. Returns `true` if one was removed.
    pub fn remove(&mut self, user_id: UserId) -> bool {
        let before = self.0.len();
        self.0.retain(|p| p.user_id != user_id);
        self.0.len() != before
    }

    /// Returns the entry for `user_id`, if any.
    #[must_use]
    pub fn get(&self, user_id: UserId) -> Option<&AccessPermission> {
        self.0.iter().find(|p| p.user_id == user_id)
    }

    /// Iterates entries in grant order.
    pub fn iter(&self) -> impl Iterator<Item = &AccessPermission> {
        self.0.iter()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the list has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Returns the level `user_id` holds on a robot owned by `owner`.
///
/// The owner always gets [`AccessLevel::Admin`]; anyone else gets their
/// list entry, or `None` when they have no access at all.
#[must_use]
pub fn granted_level(owner: UserId, permissions: &AccessList, user_id: UserId) -> Option<AccessLevel> {
    if user_id == owner {
        return Some(AccessLevel::Admin);
    }
    permissions.get(user_id).map(|p| p.level)
}

/// Returns `true` when `user_id`'s granted level is at least `required`.
#[must_use]
pub fn authorize(
    owner: UserId,
    permissions: &AccessList,
    user_id: UserId,
    required: AccessLevel,
) -> bool {
    granted_level(owner, permissions, user_id).is_some_and(|level| level >= required)
}

/// Gateway-wide role attached to an authenticated identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OperatorRole {
    /// Regular operator; rights come from per-robot grants.
    #[default]
    Operator,
    /// Fleet administrator; may run the fleet-wide emergency stop.
    Admin,
}

/// Authenticated identity handed to the core by the auth collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    /// User identifier.
    pub user_id: UserId,
    /// Gateway-wide role.
    pub role: OperatorRole,
}

impl Operator {
    /// Creates a regular operator identity.
    #[must_use]
    pub const fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            role: OperatorRole::Operator,
        }
    }

    /// Creates a fleet administrator identity.
    #[must_use]
    pub const fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            role: OperatorRole::Admin,
        }
    }

    /// Returns `true` for fleet administrators.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self.role, OperatorRole::Admin)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn grant(user_id: UserId, level: AccessLevel, by: UserId) -> AccessPermission {
        AccessPermission {
            user_id,
            level,
            granted_by: by,
            granted_at: Utc::now(),
        }
    }

    #[test]
    fn levels_are_totally_ordered() {
        assert!(AccessLevel::View < AccessLevel::Control);
        assert!(AccessLevel::Control < AccessLevel::Admin);
    }

    #[test]
    fn owner_is_always_admin() {
        let owner = UserId::new();
        let list = AccessList::new();
        assert_eq!(granted_level(owner, &list, owner), Some(AccessLevel::Admin));
        assert!(authorize(owner, &list, owner, AccessLevel::Admin));
    }

    #[test]
    fn owner_stays_admin_even_with_lower_entry() {
        let owner = UserId::new();
        let mut list = AccessList::new();
        list.upsert(grant(owner, AccessLevel::View, owner));
        assert_eq!(granted_level(owner, &list, owner), Some(AccessLevel::Admin));
    }

    #[test]
    fn unknown_user_has_no_access() {
        let owner = UserId::new();
        let list = AccessList::new();
        let stranger = UserId::new();
        assert_eq!(granted_level(owner, &list, stranger), None);
        assert!(!authorize(owner, &list, stranger, AccessLevel::View));
    }

    #[test]
    fn control_requires_control_or_admin() {
        let owner = UserId::new();
        let viewer = UserId::new();
        let driver = UserId::new();
        let admin = UserId::new();
        let list = AccessList::from_entries(vec![
            grant(viewer, AccessLevel::View, owner),
            grant(driver, AccessLevel::Control, owner),
            grant(admin, AccessLevel::Admin, owner),
        ]);

        assert!(!authorize(owner, &list, viewer, AccessLevel::Control));
        assert!(authorize(owner, &list, viewer, AccessLevel::View));
        assert!(authorize(owner, &list, driver, AccessLevel::Control));
        assert!(!authorize(owner, &list, driver, AccessLevel::Admin));
        assert!(authorize(owner, &list, admin, AccessLevel::Control));
    }

    #[test]
    fn upsert_updates_in_place() {
        let owner = UserId::new();
        let user = UserId::new();
        let other_admin = UserId::new();
        let mut list = AccessList::new();
        list.upsert(grant(user, AccessLevel::View, owner));
        list.upsert(grant(user, AccessLevel::Control, other_admin));

        assert_eq!(list.len(), 1);
        let Some(entry) = list.get(user) else {
            panic!("entry missing");
        };
        assert_eq!(entry.level, AccessLevel::Control);
        assert_eq!(entry.granted_by, other_admin);
    }

    #[test]
    fn remove_reports_whether_entry_existed() {
        let owner = UserId::new();
        let user = UserId::new();
        let mut list = AccessList::new();
        list.upsert(grant(user, AccessLevel::Control, owner));

        assert!(list.remove(user));
        assert!(!list.remove(user));
        assert!(list.is_empty());
    }

    #[test]
    fn operator_roles() {
        let id = UserId::new();
        assert!(!Operator::new(id).is_admin());
        assert!(Operator::admin(id).is_admin());
    }
}
