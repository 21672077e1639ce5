use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /health
/// Returns service version plus the state of every provider circuit breaker.
/// An open breaker does not make the service unhealthy: requests degrade.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "recommendation-api",
        "fallback_provider_enabled": state.config.enable_fallback_provider,
        "breakers": state.orchestrator.breakers(),
        "in_flight_generations": state.orchestrator.in_flight(),
    }))
}
