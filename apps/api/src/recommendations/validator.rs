//! Parses raw provider output into recommendations and rejects junk.
//!
//! A rejected response is treated by the orchestrator exactly like an
//! upstream failure: it is regenerated or replaced by the fallback table,
//! and never cached.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::llm_client::strip_json_fences;
use crate::models::recommendation::{Impact, Recommendation, RecommendationType};

#[derive(Debug, Clone, Copy)]
pub struct ValidationRules {
    pub min_recommendations: usize,
    pub min_title_chars: usize,
    pub min_reasoning_chars: usize,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            min_recommendations: 1,
            min_title_chars: 5,
            min_reasoning_chars: 20,
        }
    }
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("response is not valid recommendation JSON: {0}")]
    Malformed(String),

    #[error("expected at least {min} recommendations, found {found}")]
    TooFewRecommendations { found: usize, min: usize },

    #[error("recommendation {index}: {field} shorter than {min} characters")]
    FieldTooShort {
        index: usize,
        field: &'static str,
        min: usize,
    },

    #[error("recommendation {index}: confidence {value} outside [0, 1]")]
    ConfidenceOutOfRange { index: usize, value: f32 },
}

/// Wire shape of one item as the model emits it.
#[derive(Debug, Deserialize)]
struct RawRecommendation {
    #[serde(rename = "type")]
    kind: RecommendationType,
    title: String,
    description: String,
    reasoning: String,
    impact: Impact,
    confidence: f32,
    before_example: Option<String>,
    after_example: Option<String>,
}

/// Parses `raw` (optionally fenced) as either a bare array or an object with a
/// `recommendations` array, then applies `rules` to every item.
pub fn parse_recommendations(
    raw: &str,
    rules: &ValidationRules,
) -> Result<Vec<Recommendation>, ValidationError> {
    let value: Value = serde_json::from_str(strip_json_fences(raw))
        .map_err(|e| ValidationError::Malformed(e.to_string()))?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut object) => match object.remove("recommendations") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(ValidationError::Malformed(
                    "object without a 'recommendations' array".to_string(),
                ))
            }
        },
        _ => {
            return Err(ValidationError::Malformed(
                "expected a JSON array of recommendations".to_string(),
            ))
        }
    };

    let raw_items: Vec<RawRecommendation> = serde_json::from_value(Value::Array(items))
        .map_err(|e| ValidationError::Malformed(e.to_string()))?;

    if raw_items.len() < rules.min_recommendations {
        return Err(ValidationError::TooFewRecommendations {
            found: raw_items.len(),
            min: rules.min_recommendations,
        });
    }

    raw_items
        .into_iter()
        .enumerate()
        .map(|(index, item)| validate_item(index, item, rules))
        .collect()
}

fn validate_item(
    index: usize,
    item: RawRecommendation,
    rules: &ValidationRules,
) -> Result<Recommendation, ValidationError> {
    let title = item.title.trim().to_string();
    let reasoning = item.reasoning.trim().to_string();

    if title.chars().count() < rules.min_title_chars {
        return Err(ValidationError::FieldTooShort {
            index,
            field: "title",
            min: rules.min_title_chars,
        });
    }
    if reasoning.chars().count() < rules.min_reasoning_chars {
        return Err(ValidationError::FieldTooShort {
            index,
            field: "reasoning",
            min: rules.min_reasoning_chars,
        });
    }
    if !(0.0..=1.0).contains(&item.confidence) {
        return Err(ValidationError::ConfidenceOutOfRange {
            index,
            value: item.confidence,
        });
    }

    Ok(Recommendation {
        id: Uuid::new_v4(),
        kind: item.kind,
        title,
        description: item.description.trim().to_string(),
        reasoning,
        impact: item.impact,
        confidence: item.confidence,
        before_example: non_blank(item.before_example),
        after_example: non_blank(item.after_example),
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
