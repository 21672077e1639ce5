use std::sync::Arc;

use crate::collaborators::InMemoryCvStore;
use crate::config::Config;
use crate::recommendations::RecommendationOrchestrator;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<RecommendationOrchestrator>,
    /// Same store the orchestrator reads from; handlers write CV uploads here.
    pub cv_store: Arc<InMemoryCvStore>,
    pub config: Config,
}
