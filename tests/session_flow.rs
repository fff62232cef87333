//! End-to-end control sessions through the real WebSocket adapter.

#![allow(clippy::panic)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeRobot, at, dead_url};
use serde_json::Value;
use teleop_gateway::app_state::AppState;
use teleop_gateway::config::TransportConfig;
use teleop_gateway::domain::{
    AccessLevel, AccessList, CommandKind, CommunicationConfig, ControlMode, EventTopic,
    GestureType, HandPosition, Operator, ProtocolKind, RobotDescriptor, RobotId, RobotStatus,
    SessionState, UserId,
};
use teleop_gateway::error::GatewayError;
use teleop_gateway::protocol::{AdapterSet, WebSocketAdapter};
use teleop_gateway::service::{ConnectOutcome, SessionAuthority};

fn state() -> AppState {
    let adapters =
        AdapterSet::disabled().with(Arc::new(WebSocketAdapter::new(Duration::from_secs(15))));
    AppState::new(adapters, TransportConfig::default(), 256)
}

async fn register(authority: &SessionAuthority, owner: UserId, url: String) -> RobotId {
    let result = authority
        .register_robot(RobotDescriptor {
            id: None,
            name: "rover".to_string(),
            owner,
            communication: CommunicationConfig::new(ProtocolKind::Websocket, url),
            access_permissions: AccessList::new(),
            status: RobotStatus::Offline,
        })
        .await;
    tokio_test::assert_ok!(result)
}

fn is_command(frame: &Value) -> bool {
    frame.get("type").and_then(Value::as_str) == Some("command")
}

#[tokio::test]
async fn gesture_session_drives_robot_and_releases() {
    let Some(robot) = FakeRobot::start().await else {
        panic!("fake robot failed to bind");
    };
    let app = state();
    let authority = &app.authority;
    let owner = UserId::new();
    let driver = UserId::new();
    let id = register(authority, owner, robot.url()).await;
    tokio_test::assert_ok!(
        authority
            .grant_access(id, owner, driver, AccessLevel::Control)
            .await
    );

    let Ok(grant) = authority
        .start_session(id, driver, ControlMode::Gesture, None)
        .await
    else {
        panic!("start_session failed");
    };
    assert!(matches!(grant.connection, ConnectOutcome::Connected { .. }));
    assert!(robot.wait_connected(1).await);
    assert!(
        robot
            .wait_for(|f| f.get("type").and_then(Value::as_str) == Some("subscribe"))
            .await
            .is_some()
    );

    let Ok(SessionState::Held { session }) = authority.session_state(id, driver).await else {
        panic!("robot should be held");
    };
    assert_eq!(session.controller_id, driver);
    assert_eq!(session.mode, ControlMode::Gesture);

    let Ok(receipt) = authority
        .send_command(
            id,
            driver,
            CommandKind::Gesture {
                gesture_type: GestureType::Point,
                hand_position: HandPosition::default(),
                confidence: 0.95,
            },
        )
        .await
    else {
        panic!("send_command failed");
    };
    assert_eq!(receipt.command_type, "gesture");

    let Some(frame) = robot.wait_for(is_command).await else {
        panic!("robot never saw the command");
    };
    assert_eq!(at(&frame, "data.linear.x").and_then(Value::as_f64), Some(0.3));
    assert_eq!(at(&frame, "data.linear.y").and_then(Value::as_f64), Some(0.0));
    assert_eq!(at(&frame, "data.angular.z").and_then(Value::as_f64), Some(0.0));

    robot.push(r#"{"type":"telemetry","data":{"battery":77}}"#);
    let mut battery = None;
    for _ in 0..200 {
        let Ok(view) = authority.robot_view(id, Operator::new(driver)).await else {
            panic!("robot_view failed");
        };
        battery = view
            .telemetry
            .as_ref()
            .and_then(|t| t.payload.get("battery"))
            .and_then(Value::as_u64);
        if battery.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(battery, Some(77));

    tokio_test::assert_ok!(authority.end_session(id, driver).await);
    assert!(matches!(
        authority.session_state(id, driver).await,
        Ok(SessionState::Available)
    ));
    assert!(!authority.connections().is_connected(id).await);

    let commands = robot.wait_count(is_command, 2).await;
    assert_eq!(commands.len(), 2);
    let Some(stop) = commands.last() else {
        panic!("missing stop frame");
    };
    assert_eq!(at(stop, "data.linear.x").and_then(Value::as_f64), Some(0.0));
}

#[tokio::test]
async fn second_driver_is_refused_while_held() {
    let Some(robot) = FakeRobot::start().await else {
        panic!("fake robot failed to bind");
    };
    let app = state();
    let authority = &app.authority;
    let owner = UserId::new();
    let other = UserId::new();
    let id = register(authority, owner, robot.url()).await;
    tokio_test::assert_ok!(
        authority
            .grant_access(id, owner, other, AccessLevel::Admin)
            .await
    );

    tokio_test::assert_ok!(
        authority
            .start_session(id, owner, ControlMode::Manual, None)
            .await
    );
    let refused = authority
        .start_session(id, other, ControlMode::Manual, None)
        .await;
    assert!(matches!(refused, Err(GatewayError::NotAvailable { .. })));

    let hijack = authority.send_command(id, other, CommandKind::Stop).await;
    let Err(error) = hijack else {
        panic!("non-holder command must fail");
    };
    assert_eq!(error.error_code(), 2102);
    assert_eq!(error.details(), Some(format!("holder={owner}")));

    tokio_test::assert_ok!(authority.end_session(id, owner).await);
}

#[tokio::test]
async fn fleet_stop_reports_unreachable_robot() {
    let Some(robot) = FakeRobot::start().await else {
        panic!("fake robot failed to bind");
    };
    let Some(dead) = dead_url().await else {
        panic!("could not reserve a port");
    };
    let app = state();
    let authority = &app.authority;
    let owner = UserId::new();

    let mut ids = Vec::new();
    for url in [robot.url(), dead, robot.url()] {
        let id = register(authority, owner, url).await;
        tokio_test::assert_ok!(
            authority
                .start_session(id, owner, ControlMode::Manual, None)
                .await
        );
        ids.push(id);
    }

    let Ok(report) = authority
        .emergency_stop_all(Operator::admin(UserId::new()))
        .await
    else {
        panic!("fleet stop failed");
    };
    assert_eq!(report.total_robots, 3);
    let outcomes: Vec<bool> = report.results.iter().map(|r| r.success).collect();
    assert_eq!(outcomes, vec![true, false, true]);
    let returned: Vec<RobotId> = report.results.iter().map(|r| r.robot_id).collect();
    assert_eq!(returned, ids);

    assert_eq!(robot.wait_count(is_command, 2).await.len(), 2);
    for id in ids {
        let Ok(snapshot) = authority.robots().snapshot(id).await else {
            panic!("robot missing");
        };
        assert_eq!(snapshot.status, RobotStatus::Error);
        assert!(snapshot.current_session.is_none());
    }
}

#[tokio::test]
async fn robot_hanging_up_is_reported_offline() {
    let Some(robot) = FakeRobot::start().await else {
        panic!("fake robot failed to bind");
    };
    let app = state();
    let authority = &app.authority;
    let owner = UserId::new();
    let id = register(authority, owner, robot.url()).await;

    let Ok(grant) = authority
        .start_session(id, owner, ControlMode::Manual, None)
        .await
    else {
        panic!("start_session failed");
    };
    assert!(matches!(grant.connection, ConnectOutcome::Connected { .. }));
    assert!(robot.wait_connected(1).await);
    let mut events = app.event_bus.subscribe_robot(id, &[EventTopic::Status]);

    drop(robot);

    let mut seen = Vec::new();
    while seen.len() < 2 {
        let Ok(Some(event)) = tokio::time::timeout(Duration::from_secs(2), events.recv()).await
        else {
            panic!("hang-up not reported; saw {seen:?}");
        };
        seen.push(event.event_type_str().to_string());
    }
    assert_eq!(seen, ["connection_changed", "status_changed"]);

    let status = authority.connections().status(id).await;
    assert!(!status.connected);
    assert!(status.protocol.is_none());
    let Ok(snapshot) = authority.robots().snapshot(id).await else {
        panic!("robot missing");
    };
    assert_eq!(snapshot.status, RobotStatus::Offline);
    // The session outlives the link; the holder still ends it.
    tokio_test::assert_ok!(authority.end_session(id, owner).await);
}
