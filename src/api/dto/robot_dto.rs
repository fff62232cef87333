//! Robot registration and access-administration DTOs.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::common_dto::PaginationMeta;
use crate::domain::{
    AccessLevel, AccessList, CommunicationConfig, RobotDescriptor, RobotId, RobotSummary, UserId,
};

/// Request body for `POST /robots`. The caller becomes the owner.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RegisterRobotRequest {
    /// Externally assigned id; generated when absent.
    #[serde(default)]
    pub id: Option<RobotId>,
    /// Display name.
    pub name: String,
    /// Transport settings.
    pub communication: CommunicationConfig,
}

impl RegisterRobotRequest {
    /// Builds the registry descriptor owned by `owner`.
    #[must_use]
    pub fn into_descriptor(self, owner: UserId) -> RobotDescriptor {
        RobotDescriptor {
            id: self.id,
            name: self.name,
            owner,
            communication: self.communication,
            access_permissions: AccessList::new(),
            status: crate::domain::RobotStatus::Offline,
        }
    }
}

/// Paginated robot list.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RobotListResponse {
    /// Robots on this page, in registration order.
    pub data: Vec<RobotSummary>,
    /// Page metadata.
    pub pagination: PaginationMeta,
}

/// Request body for `PUT /robots/{id}/access`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct GrantAccessRequest {
    /// User receiving the grant.
    pub user_id: UserId,
    /// Granted level.
    pub level: AccessLevel,
}

/// Response body for `DELETE /robots/{id}/access/{user_id}`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RevokeAccessResponse {
    /// Robot identifier.
    pub robot_id: RobotId,
    /// User whose grant was targeted.
    pub user_id: UserId,
    /// Whether a grant was removed.
    pub removed: bool,
}

/// Request body for `PUT /robots/{id}/maintenance`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct MaintenanceRequest {
    /// `true` to enter maintenance, `false` to leave it.
    pub enabled: bool,
}
