//! Shared application state.

use kbase_core::KbaseConfig;
use kbase_runtime::Orchestrator;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    pub config: KbaseConfig,
    pub orchestrator: Orchestrator,
}

impl AppState {
    pub fn new(config: KbaseConfig, orchestrator: Orchestrator) -> Self {
        Self {
            config,
            orchestrator,
        }
    }
}
