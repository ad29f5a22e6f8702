//! Shared application state injected into all Axum handlers.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::BroadcasterConfig;
use crate::hub::HubHandle;
use crate::ws::{ConnectionSettings, OriginPolicy};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Handle to the hub coordination loop.
    pub hub: HubHandle,
    /// Allow-list checked on every WebSocket upgrade.
    pub origin_policy: Arc<OriginPolicy>,
    /// Deadlines and limits for new connections.
    pub connection_settings: ConnectionSettings,
    /// Browser front end served at `/`.
    pub index_path: Arc<PathBuf>,
}

impl AppState {
    /// Builds the state from a running hub and the loaded configuration.
    #[must_use]
    pub fn new(hub: HubHandle, config: &BroadcasterConfig) -> Self {
        Self {
            hub,
            origin_policy: Arc::new(OriginPolicy::from_hosts(&config.allowed_hosts)),
            connection_settings: ConnectionSettings::default(),
            index_path: Arc::new(config.index_path.clone()),
        }
    }
}
