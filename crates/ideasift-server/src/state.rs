//! Server state management.

use std::sync::Arc;

use ideasift_core::config::EngineConfig;
use ideasift_core::error::SiftResult;
use ideasift_core::RecommendationService;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RecommendationService>,
}

impl AppState {
    pub fn new(service: RecommendationService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }

    /// Build the service from configuration, opening its store.
    pub fn from_config(config: EngineConfig) -> SiftResult<Self> {
        Ok(Self::new(RecommendationService::from_config(config)?))
    }

    /// State over an empty in-memory store.
    pub fn in_memory() -> SiftResult<Self> {
        Self::from_config(EngineConfig::builder().in_memory().build())
    }
}
