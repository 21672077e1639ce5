//! Narrow interfaces to the systems around the recommendation core:
//! usage limiting, CV content, and observability.
//!
//! Each is a trait carried as `Arc<dyn …>` so deployments and tests can swap
//! implementations without touching the orchestrator.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::models::recommendation::SourceTier;

// ────────────────────────────────────────────────────────────────────────────
// Billing / usage limiting
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuotaDecision {
    Allowed,
    /// Returned by billing-backed limiters; the default deployment is unmetered.
    #[allow(dead_code)]
    Denied { reason: String },
}

#[async_trait]
pub trait UsageLimiter: Send + Sync {
    async fn check(&self, subject_id: Uuid) -> QuotaDecision;
}

/// Allows everything. Used when no billing service is wired in.
pub struct UnmeteredLimiter;

#[async_trait]
impl UsageLimiter for UnmeteredLimiter {
    async fn check(&self, _subject_id: Uuid) -> QuotaDecision {
        QuotaDecision::Allowed
    }
}

// ────────────────────────────────────────────────────────────────────────────
// CV content
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CvDocument {
    pub content_hash: String,
    pub content: String,
}

impl CvDocument {
    /// Builds a document whose hash is derived from its content (blake3 hex).
    pub fn from_content(content: impl Into<String>) -> Self {
        let content = content.into();
        let content_hash = blake3::hash(content.as_bytes()).to_hex().to_string();
        Self {
            content_hash,
            content,
        }
    }
}

#[derive(Debug, Error)]
pub enum CvStoreError {
    #[error("CV {content_hash} not found for subject {subject_id}")]
    NotFound {
        subject_id: Uuid,
        content_hash: String,
    },

    #[error("CV store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait CvContentStore: Send + Sync {
    async fn fetch(&self, subject_id: Uuid, content_hash: &str) -> Result<CvDocument, CvStoreError>;
}

/// Process-local CV store keyed by (subject, content hash).
#[derive(Default)]
pub struct InMemoryCvStore {
    documents: RwLock<HashMap<(Uuid, String), Arc<CvDocument>>>,
}

impl InMemoryCvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `content` for `subject_id` and returns its content hash.
    pub fn put(&self, subject_id: Uuid, content: impl Into<String>) -> String {
        let document = CvDocument::from_content(content);
        let hash = document.content_hash.clone();
        self.documents
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert((subject_id, hash.clone()), Arc::new(document));
        hash
    }
}

#[async_trait]
impl CvContentStore for InMemoryCvStore {
    async fn fetch(&self, subject_id: Uuid, content_hash: &str) -> Result<CvDocument, CvStoreError> {
        let documents = self
            .documents
            .read()
            .map_err(|_| CvStoreError::Unavailable("CV store lock poisoned".to_string()))?;
        documents
            .get(&(subject_id, content_hash.to_string()))
            .map(|doc| doc.as_ref().clone())
            .ok_or_else(|| CvStoreError::NotFound {
                subject_id,
                content_hash: content_hash.to_string(),
            })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Observability
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    CacheHit,
    Generated,
    Degraded,
    QuotaDenied,
    Unavailable,
    TimedOut,
}

/// One completed `get_recommendations` call.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsEvent {
    pub key: String,
    pub tier: Option<SourceTier>,
    pub latency_ms: u64,
    pub outcome: Outcome,
}

pub trait MetricsSink: Send + Sync {
    fn record(&self, event: MetricsEvent);
}

/// Emits events as structured tracing records.
pub struct TracingMetricsSink;

impl MetricsSink for TracingMetricsSink {
    fn record(&self, event: MetricsEvent) {
        info!(
            target: "recommendation_metrics",
            key = %event.key,
            tier = event.tier.map(|t| t.as_str()).unwrap_or("none"),
            latency_ms = event.latency_ms,
            outcome = ?event.outcome,
            "recommendation request completed"
        );
    }
}
