//! REST surface against a server bound to an ephemeral port.

#![allow(clippy::panic)]

mod common;

use std::time::Duration;

use common::{FakeRobot, at};
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use teleop_gateway::app_state::AppState;
use teleop_gateway::build_app;
use teleop_gateway::config::TransportConfig;
use teleop_gateway::domain::UserId;
use teleop_gateway::protocol::AdapterSet;

struct Server {
    base: String,
    client: Client,
}

impl Server {
    async fn start() -> Self {
        let transport = TransportConfig::default();
        let state = AppState::new(AdapterSet::from_config(&transport), transport, 256);
        let app = build_app(state, Duration::from_secs(10));
        let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
            panic!("bind failed");
        };
        let Ok(addr) = listener.local_addr() else {
            panic!("no local addr");
        };
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self {
            base: format!("http://{addr}"),
            client: Client::new(),
        }
    }

    async fn call(
        &self,
        method: reqwest::Method,
        path: &str,
        user: Option<(UserId, &str)>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = self.client.request(method, format!("{}{path}", self.base));
        if let Some((id, role)) = user {
            req = req.header("x-user-id", id.to_string()).header("x-user-role", role);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        let Ok(resp) = req.send().await else {
            panic!("request to {path} failed");
        };
        let status = resp.status();
        let body = resp.json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }
}

fn error_code(body: &Value) -> Option<u64> {
    at(body, "error.code").and_then(Value::as_u64)
}

#[tokio::test]
async fn health_and_protocol_catalog() {
    let server = Server::start().await;
    let (status, body) = server.call(reqwest::Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.get("status").and_then(Value::as_str), Some("healthy"));

    let (status, body) = server
        .call(reqwest::Method::GET, "/config/protocols", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let Some(entries) = body.as_array() else {
        panic!("catalog should be an array");
    };
    assert_eq!(entries.len(), 4);
    let available = |name: &str| {
        entries
            .iter()
            .find(|e| e.get("protocol").and_then(Value::as_str) == Some(name))
            .and_then(|e| e.get("available"))
            .and_then(Value::as_bool)
    };
    assert_eq!(available("websocket"), Some(true));
    assert_eq!(available("mqtt"), Some(false));
}

#[tokio::test]
async fn missing_identity_is_rejected() {
    let server = Server::start().await;
    let (status, body) = server
        .call(
            reqwest::Method::POST,
            "/api/v1/robots",
            None,
            Some(json!({"name": "r", "communication": {"protocol": "websocket"}})),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), Some(1003));
}

#[tokio::test]
async fn session_lifecycle_over_http() {
    let Some(robot) = FakeRobot::start().await else {
        panic!("fake robot failed to bind");
    };
    let server = Server::start().await;
    let owner = UserId::new();
    let driver = UserId::new();
    let viewer = UserId::new();

    let (status, body) = server
        .call(
            reqwest::Method::POST,
            "/api/v1/robots",
            Some((owner, "operator")),
            Some(json!({
                "name": "rover-1",
                "communication": {"protocol": "websocket", "endpoint": robot.url()},
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let Some(id) = body.get("robot_id").and_then(Value::as_str).map(str::to_string) else {
        panic!("robot_id missing: {body}");
    };

    for (user, level) in [(driver, "control"), (viewer, "view")] {
        let (status, _) = server
            .call(
                reqwest::Method::PUT,
                &format!("/api/v1/robots/{id}/access"),
                Some((owner, "operator")),
                Some(json!({"user_id": user, "level": level})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let session_path = format!("/api/v1/robots/{id}/session");
    let (status, body) = server
        .call(
            reqwest::Method::POST,
            &session_path,
            Some((viewer, "operator")),
            Some(json!({})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), Some(4003));

    let (status, body) = server
        .call(
            reqwest::Method::POST,
            &session_path,
            Some((driver, "operator")),
            Some(json!({"mode": "manual"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        at(&body, "connection.outcome").and_then(Value::as_str),
        Some("connected")
    );

    let (status, body) = server
        .call(
            reqwest::Method::POST,
            &session_path,
            Some((owner, "operator")),
            Some(json!({})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), Some(2101));

    let command_path = format!("/api/v1/robots/{id}/commands");
    let manual = json!({"command": {"type": "manual", "linear": {"x": 0.4}}});
    let (status, body) = server
        .call(
            reqwest::Method::POST,
            &command_path,
            Some((owner, "operator")),
            Some(manual.clone()),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), Some(2102));

    let (status, body) = server
        .call(
            reqwest::Method::POST,
            &command_path,
            Some((driver, "operator")),
            Some(manual),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(at(&body, "velocity.linear.x").and_then(Value::as_f64), Some(0.4));

    let (status, body) = server
        .call(
            reqwest::Method::GET,
            &session_path,
            Some((viewer, "operator")),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.get("state").and_then(Value::as_str), Some("held"));

    let (status, body) = server
        .call(
            reqwest::Method::DELETE,
            &session_path,
            Some((viewer, "operator")),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), Some(4003));

    let (status, _) = server
        .call(
            reqwest::Method::DELETE,
            &session_path,
            Some((driver, "operator")),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = server
        .call(
            reqwest::Method::GET,
            &format!("/api/v1/robots/{id}/connection"),
            Some((viewer, "operator")),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.get("connected").and_then(Value::as_bool), Some(false));
}

#[tokio::test]
async fn fleet_stop_requires_fleet_admin() {
    let server = Server::start().await;
    let (status, body) = server
        .call(
            reqwest::Method::POST,
            "/api/v1/fleet/emergency-stop",
            Some((UserId::new(), "operator")),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), Some(4003));

    let (status, body) = server
        .call(
            reqwest::Method::POST,
            "/api/v1/fleet/emergency-stop",
            Some((UserId::new(), "admin")),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.get("total_robots").and_then(Value::as_u64), Some(0));
}
