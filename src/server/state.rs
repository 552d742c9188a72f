use std::sync::Arc;

use crate::orchestrator::Orchestrator;

/// Shared application state
pub struct AppState {
    pub orchestrator: Orchestrator,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator) -> Arc<Self> {
        Arc::new(AppState { orchestrator })
    }
}
