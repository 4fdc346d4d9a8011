//! Application state.

use std::sync::Arc;

use sheetcap_media::Capabilities;
use sheetcap_orchestrator::{JobOrchestrator, OrchestratorConfig};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub orchestrator: Arc<JobOrchestrator>,
}

impl AppState {
    /// Create new application state: probe the local machine's hardware
    /// capabilities once at startup and hand them to a fresh orchestrator.
    pub fn new(config: ApiConfig) -> Self {
        let orchestrator_config = OrchestratorConfig::from_env();
        let capabilities = Capabilities::probe();
        let orchestrator = Arc::new(JobOrchestrator::new(orchestrator_config, capabilities));

        Self { config, orchestrator }
    }
}
