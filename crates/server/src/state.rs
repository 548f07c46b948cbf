use std::sync::Arc;

use reposcout_core::{Authenticator, Config, DiscoveryOrchestrator, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    authenticator: Arc<dyn Authenticator>,
    /// Absent when no upstream is configured.
    orchestrator: Option<Arc<DiscoveryOrchestrator>>,
}

impl AppState {
    pub fn new(
        config: Config,
        authenticator: Arc<dyn Authenticator>,
        orchestrator: Option<Arc<DiscoveryOrchestrator>>,
    ) -> Self {
        Self {
            config,
            authenticator,
            orchestrator,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn authenticator(&self) -> &dyn Authenticator {
        self.authenticator.as_ref()
    }

    pub fn orchestrator(&self) -> Option<&Arc<DiscoveryOrchestrator>> {
        self.orchestrator.as_ref()
    }
}
