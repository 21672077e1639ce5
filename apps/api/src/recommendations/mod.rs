pub mod fallback;
pub mod handlers;
pub mod orchestrator;
pub mod prompt_builder;
pub mod prompts;
pub mod single_flight;
pub mod validator;

pub use orchestrator::{
    Collaborators, OrchestratorConfig, RecommendationError, RecommendationOrchestrator,
};
