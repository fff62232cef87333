//! Gateway configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Transport settings live in
//! [`TransportConfig`], which implements [`Default`] so tests and embedders
//! can build one without touching the environment.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;

/// Log output format selected by `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable text.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Settings for the connection registry and the protocol adapters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Upper bound for an adapter connect.
    pub connect_timeout: Duration,
    /// Upper bound for a single command send.
    pub send_timeout: Duration,
    /// Upper bound for a disconnect.
    pub disconnect_timeout: Duration,
    /// Interval between keep-alive pings on WebSocket links.
    pub keepalive_interval: Duration,
    /// Capacity of the per-connection inbound message channel.
    pub inbound_buffer: usize,
    /// WebSocket URL of the ROS 2 bus node; `None` disables the ROS 2 adapter.
    pub ros2_node_url: Option<String>,
    /// Whether the ROS-bridge adapter is enabled.
    pub rosbridge_enabled: bool,
    /// Whether the raw WebSocket adapter is enabled.
    pub websocket_enabled: bool,
    /// MQTT broker URL (`mqtt://host:port`); `None` disables the MQTT adapter.
    pub mqtt_broker_url: Option<String>,
    /// First MQTT reconnect delay.
    pub mqtt_reconnect_base: Duration,
    /// Ceiling for the MQTT reconnect delay.
    pub mqtt_reconnect_max: Duration,
    /// Consecutive MQTT failures before the link gives up.
    pub mqtt_max_reconnect_attempts: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(5_000),
            send_timeout: Duration::from_millis(1_000),
            disconnect_timeout: Duration::from_millis(2_000),
            keepalive_interval: Duration::from_secs(15),
            inbound_buffer: 256,
            ros2_node_url: None,
            rosbridge_enabled: true,
            websocket_enabled: true,
            mqtt_broker_url: None,
            mqtt_reconnect_base: Duration::from_millis(500),
            mqtt_reconnect_max: Duration::from_millis(30_000),
            mqtt_max_reconnect_attempts: 10,
        }
    }
}

impl TransportConfig {
    /// Loads transport settings from the environment, falling back to
    /// [`TransportConfig::default`] per key.
    #[must_use]
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            connect_timeout: parse_env_ms("CONNECT_TIMEOUT_MS", d.connect_timeout),
            send_timeout: parse_env_ms("SEND_TIMEOUT_MS", d.send_timeout),
            disconnect_timeout: parse_env_ms("DISCONNECT_TIMEOUT_MS", d.disconnect_timeout),
            keepalive_interval: Duration::from_secs(parse_env(
                "KEEPALIVE_INTERVAL_SECS",
                d.keepalive_interval.as_secs(),
            )),
            inbound_buffer: parse_env("INBOUND_BUFFER", d.inbound_buffer).max(1),
            ros2_node_url: parse_env_opt("ROS2_NODE_URL"),
            rosbridge_enabled: parse_env_bool("ROSBRIDGE_ENABLED", d.rosbridge_enabled),
            websocket_enabled: parse_env_bool("WEBSOCKET_ENABLED", d.websocket_enabled),
            mqtt_broker_url: parse_env_opt("MQTT_BROKER_URL"),
            mqtt_reconnect_base: parse_env_ms("MQTT_RECONNECT_BASE_MS", d.mqtt_reconnect_base),
            mqtt_reconnect_max: parse_env_ms("MQTT_RECONNECT_MAX_MS", d.mqtt_reconnect_max),
            mqtt_max_reconnect_attempts: parse_env(
                "MQTT_MAX_RECONNECT_ATTEMPTS",
                d.mqtt_max_reconnect_attempts,
            ),
        }
    }
}

/// Top-level gateway configuration.
///
/// Loaded once at startup via [`GatewayConfig::from_env`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:3000`).
    pub listen_addr: SocketAddr,

    /// Capacity of the EventBus broadcast channel.
    pub event_bus_capacity: usize,

    /// Log output format.
    pub log_format: LogFormat,

    /// Upper bound on a single HTTP request.
    pub request_timeout: Duration,

    /// Connection registry and adapter settings.
    pub transport: TransportConfig,
}

impl GatewayConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to sensible defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` is set but cannot be parsed as
    /// a [`SocketAddr`].
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let raw_addr = std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let listen_addr: SocketAddr = raw_addr
            .parse()
            .with_context(|| format!("invalid LISTEN_ADDR: {raw_addr}"))?;

        let event_bus_capacity = parse_env("EVENT_BUS_CAPACITY", 10_000);

        let log_format = match std::env::var("LOG_FORMAT").ok().as_deref() {
            Some("json") | Some("JSON") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            listen_addr,
            event_bus_capacity,
            log_format,
            request_timeout: parse_env_ms("REQUEST_TIMEOUT_MS", Duration::from_secs(30)),
            transport: TransportConfig::from_env(),
        })
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable holding milliseconds.
fn parse_env_ms(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
pub(crate) fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Returns the trimmed variable, treating empty values as unset.
fn parse_env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).ok().as_deref() {
        Some("true") | Some("TRUE") | Some("1") => true,
        Some("false") | Some("FALSE") | Some("0") => false,
        _ => default,
    }
}
