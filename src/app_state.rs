//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::domain::ConnectionRegistry;
use crate::service::BroadcastEngine;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Broadcast engine; also owns the room's connection registry.
    pub engine: BroadcastEngine,
    /// Immutable server configuration.
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Builds the state for one room with a fresh registry.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let engine = BroadcastEngine::new(registry, config.broadcast_options());
        Self {
            engine,
            config: Arc::new(config),
        }
    }

    /// Returns the room's connection registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        self.engine.registry()
    }
}
