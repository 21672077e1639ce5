pub mod health;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::recommendations::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // CV content
        .route("/api/v1/cv", post(handlers::handle_store_cv))
        // Recommendations
        .route(
            "/api/v1/recommendations",
            post(handlers::handle_get_recommendations),
        )
        .route(
            "/api/v1/recommendations/:subject_id",
            delete(handlers::handle_invalidate),
        )
        .with_state(state)
}
