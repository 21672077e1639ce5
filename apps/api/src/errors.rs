use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::recommendations::RecommendationError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),
}

impl From<RecommendationError> for AppError {
    fn from(e: RecommendationError) -> Self {
        match e {
            RecommendationError::QuotaExceeded { .. } => AppError::QuotaExceeded(e.to_string()),
            RecommendationError::ServiceUnavailable(_) => {
                AppError::ServiceUnavailable(e.to_string())
            }
            RecommendationError::DeadlineExceeded(_) => AppError::DeadlineExceeded(e.to_string()),
        }
    }
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::QuotaExceeded(msg) => {
                (StatusCode::TOO_MANY_REQUESTS, "QUOTA_EXCEEDED", msg.clone())
            }
            AppError::ServiceUnavailable(msg) => {
                tracing::error!("Service unavailable: {msg}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Recommendations are temporarily unavailable".to_string(),
                )
            }
            AppError::DeadlineExceeded(msg) => (
                StatusCode::GATEWAY_TIMEOUT,
                "DEADLINE_EXCEEDED",
                format!("{msg}; retry shortly"),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use uuid::Uuid;

    #[test]
    fn test_recommendation_errors_map_to_status_codes() {
        let cases = [
            (
                RecommendationError::QuotaExceeded {
                    subject_id: Uuid::nil(),
                    reason: "limit".to_string(),
                },
                StatusCode::TOO_MANY_REQUESTS,
                "QUOTA_EXCEEDED",
            ),
            (
                RecommendationError::ServiceUnavailable("down".to_string()),
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
            ),
            (
                RecommendationError::DeadlineExceeded(Duration::from_secs(30)),
                StatusCode::GATEWAY_TIMEOUT,
                "DEADLINE_EXCEEDED",
            ),
        ];
        for (error, status, code) in cases {
            let (got_status, got_code, _) = AppError::from(error).parts();
            assert_eq!(got_status, status);
            assert_eq!(got_code, code);
        }
    }

    #[test]
    fn test_validation_is_bad_request() {
        let response = AppError::Validation("empty".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
