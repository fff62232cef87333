//! OpenAPI document for the REST surface.

use utoipa::OpenApi;

use super::handlers::{connection, emergency, robot, session, system};

/// Aggregated OpenAPI description of every REST endpoint.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "teleop-gateway",
        description = "Robot communication and exclusive control-session gateway. Identity is read from the `x-user-id` and `x-user-role` headers."
    ),
    paths(
        robot::register_robot,
        robot::list_robots,
        robot::get_robot,
        robot::retire_robot,
        robot::grant_access,
        robot::revoke_access,
        robot::clear_fault,
        robot::set_maintenance,
        session::start_session,
        session::get_session,
        session::end_session,
        session::send_command,
        connection::connect_robot,
        connection::connection_status,
        connection::disconnect_robot,
        emergency::emergency_stop,
        emergency::emergency_stop_all,
        system::health_handler,
        system::protocols_handler,
    ),
    tags(
        (name = "Robots", description = "Robot records and administration"),
        (name = "Access", description = "Per-robot access grants"),
        (name = "Sessions", description = "Exclusive control sessions and commands"),
        (name = "Connections", description = "Protocol links"),
        (name = "Emergency", description = "Emergency stops"),
        (name = "System", description = "Health and configuration"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_session_and_fleet_paths() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/v1/robots/{id}/session"));
        assert!(doc.paths.paths.contains_key("/api/v1/fleet/emergency-stop"));
        assert!(doc.paths.paths.contains_key("/config/protocols"));
    }
}
