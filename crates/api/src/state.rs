use std::sync::Arc;

use reelflow_pipeline::Orchestrator;

use crate::config::ServerConfig;

/// Shared application state available to all axum handlers via
/// `State<AppState>`. Cheaply cloneable.
#[derive(Clone)]
pub struct AppState {
    /// The workflow orchestrator (store, provider clients, runtimes).
    pub orchestrator: Orchestrator,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
}
