//! Axum route handlers for the Recommendations API.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::recommendation::{
    CareerLevel, RecommendationRequest, RecommendationSet, SubjectContext,
};
use crate::state::AppState;

/// Set by the gateway after authentication; `premium` unlocks deep analysis.
pub const SUBJECT_TIER_HEADER: &str = "x-subject-tier";

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct GetRecommendationsRequest {
    pub subject_id: Uuid,
    pub cv_content_hash: String,
    pub target_role: Option<String>,
    pub target_industry: Option<String>,
    pub career_level: Option<CareerLevel>,
}

#[derive(Debug, Deserialize)]
pub struct StoreCvRequest {
    pub subject_id: Uuid,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct StoreCvResponse {
    pub cv_content_hash: String,
    pub invalidated: u64,
}

#[derive(Debug, Serialize)]
pub struct InvalidateResponse {
    pub invalidated: u64,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/recommendations
///
/// Returns cached, freshly generated or degraded recommendations. Only quota
/// denial, deadline expiry and total unavailability surface as errors.
pub async fn handle_get_recommendations(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<GetRecommendationsRequest>,
) -> Result<Json<RecommendationSet>, AppError> {
    if body.cv_content_hash.trim().is_empty() {
        return Err(AppError::Validation(
            "cv_content_hash cannot be empty".to_string(),
        ));
    }

    let subject = SubjectContext {
        subject_id: body.subject_id,
        premium: is_premium(&headers),
    };
    let request = RecommendationRequest::new(
        subject,
        body.cv_content_hash.trim(),
        body.target_role,
        body.target_industry,
        body.career_level,
    );

    let set = state.orchestrator.get_recommendations(request).await?;
    Ok(Json(set))
}

/// POST /api/v1/cv
///
/// Stores CV text and drops the subject's cached recommendations, since any
/// of them may have been built from an older version.
pub async fn handle_store_cv(
    State(state): State<AppState>,
    Json(body): Json<StoreCvRequest>,
) -> Result<Json<StoreCvResponse>, AppError> {
    if body.content.trim().is_empty() {
        return Err(AppError::Validation("content cannot be empty".to_string()));
    }

    let cv_content_hash = state.cv_store.put(body.subject_id, body.content);
    let invalidated = state
        .orchestrator
        .invalidate_subject(body.subject_id)
        .await;

    Ok(Json(StoreCvResponse {
        cv_content_hash,
        invalidated,
    }))
}

/// DELETE /api/v1/recommendations/:subject_id
pub async fn handle_invalidate(
    State(state): State<AppState>,
    Path(subject_id): Path<Uuid>,
) -> Json<InvalidateResponse> {
    let invalidated = state.orchestrator.invalidate_subject(subject_id).await;
    Json(InvalidateResponse { invalidated })
}

fn is_premium(headers: &HeaderMap) -> bool {
    headers
        .get(SUBJECT_TIER_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|tier| tier.trim().eq_ignore_ascii_case("premium"))
}
