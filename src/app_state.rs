//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::domain::EventBus;
use crate::service::SessionAuthority;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Session authority: every robot, session, and connection operation.
    pub authority: Arc<SessionAuthority>,
    /// Event bus for WebSocket subscriptions.
    pub event_bus: EventBus,
}

impl AppState {
    /// Wires the registries and the authority over `adapters`.
    #[must_use]
    pub fn new(
        adapters: crate::protocol::AdapterSet,
        transport: crate::config::TransportConfig,
        event_bus_capacity: usize,
    ) -> Self {
        let robots = Arc::new(crate::domain::RobotRegistry::new());
        let event_bus = EventBus::new(event_bus_capacity);
        let connections = Arc::new(crate::service::ConnectionRegistry::new(
            adapters,
            Arc::clone(&robots),
            event_bus.clone(),
            transport,
        ));
        let authority = Arc::new(SessionAuthority::new(
            robots,
            connections,
            event_bus.clone(),
        ));
        Self {
            authority,
            event_bus,
        }
    }
}
