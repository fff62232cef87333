//! Fleet-wide emergency stop.

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use utoipa::ToSchema;

use super::session_authority::SessionAuthority;
use crate::domain::{Operator, RobotId, UserId};
use crate::error::{ErrorBody, GatewayError};

/// Per-robot outcome of a fleet stop.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RobotStopResult {
    /// Robot that was stopped.
    pub robot_id: RobotId,
    /// Whether the stop command reached the robot.
    pub success: bool,
    /// Failure detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

/// Report of a fleet-wide emergency stop.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FleetStopReport {
    /// Robots that held a session when the stop began.
    pub total_robots: usize,
    /// One entry per robot, in registration order.
    pub results: Vec<RobotStopResult>,
    /// Fleet admin who issued the stop.
    pub executed_by: UserId,
    /// When the stop was issued.
    pub timestamp: DateTime<Utc>,
}

impl FleetStopReport {
    /// Number of robots whose stop failed.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.results.iter().filter(|r| !r.success).count()
    }
}

impl SessionAuthority {
    /// Emergency-stops every robot with a held session, concurrently.
    ///
    /// Each robot is faulted regardless of whether its send succeeds; one
    /// failure never prevents the others from being attempted.
    ///
    /// # Errors
    ///
    /// [`GatewayError::AccessDenied`] unless `operator` is a fleet admin.
    pub async fn emergency_stop_all(&self, operator: Operator) -> Result<FleetStopReport, GatewayError> {
        if !operator.is_admin() {
            return Err(GatewayError::AccessDenied(
                "fleet admin role required".to_string(),
            ));
        }

        let targets = self.held_robots().await;
        let timestamp = Utc::now();
        tracing::warn!(user_id = %operator.user_id, robots = targets.len(), "fleet emergency stop");

        let outcomes = join_all(
            targets
                .iter()
                .map(|&robot_id| self.force_emergency_stop(robot_id, operator.user_id)),
        )
        .await;

        let results: Vec<RobotStopResult> = targets
            .iter()
            .zip(outcomes)
            .map(|(&robot_id, outcome)| RobotStopResult {
                robot_id,
                success: outcome.is_ok(),
                error: outcome.err().map(|e| e.to_body()),
            })
            .collect();

        let report = FleetStopReport {
            total_robots: targets.len(),
            results,
            executed_by: operator.user_id,
            timestamp,
        };
        tracing::info!(
            user_id = %operator.user_id,
            total = report.total_robots,
            failed = report.failures(),
            "fleet emergency stop complete"
        );
        Ok(report)
    }
}
