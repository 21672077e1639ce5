use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Category of a single recommendation. Provider output is parsed strictly
/// into this enum; unknown values reject the whole set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationType {
    Content,
    Structure,
    Keyword,
    Ats,
    Formatting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CareerLevel {
    Entry,
    Mid,
    Senior,
    Executive,
}

impl CareerLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            CareerLevel::Entry => "entry",
            CareerLevel::Mid => "mid",
            CareerLevel::Senior => "senior",
            CareerLevel::Executive => "executive",
        }
    }
}

/// How thorough the analysis should be. Selected from the subject's tier,
/// never supplied directly by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestedDepth {
    Standard,
    Deep,
}

impl RequestedDepth {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestedDepth::Standard => "standard",
            RequestedDepth::Deep => "deep",
        }
    }

    /// Number of recommendations the prompt asks for.
    pub fn target_count(self) -> usize {
        match self {
            RequestedDepth::Standard => 5,
            RequestedDepth::Deep => 10,
        }
    }
}

/// Identity and plan information handed over by the auth layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubjectContext {
    pub subject_id: Uuid,
    pub premium: bool,
}

impl SubjectContext {
    pub fn depth(&self) -> RequestedDepth {
        if self.premium {
            RequestedDepth::Deep
        } else {
            RequestedDepth::Standard
        }
    }
}

/// Immutable input to `get_recommendations`. All fields that influence the
/// generated output feed the cache key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecommendationRequest {
    subject_id: Uuid,
    cv_content_hash: String,
    target_role: Option<String>,
    target_industry: Option<String>,
    career_level: Option<CareerLevel>,
    requested_depth: RequestedDepth,
}

impl RecommendationRequest {
    pub fn new(
        subject: SubjectContext,
        cv_content_hash: impl Into<String>,
        target_role: Option<String>,
        target_industry: Option<String>,
        career_level: Option<CareerLevel>,
    ) -> Self {
        Self {
            subject_id: subject.subject_id,
            cv_content_hash: cv_content_hash.into(),
            target_role: normalize(target_role),
            target_industry: normalize(target_industry),
            career_level,
            requested_depth: subject.depth(),
        }
    }

    pub fn subject_id(&self) -> Uuid {
        self.subject_id
    }

    pub fn cv_content_hash(&self) -> &str {
        &self.cv_content_hash
    }

    pub fn target_role(&self) -> Option<&str> {
        self.target_role.as_deref()
    }

    pub fn target_industry(&self) -> Option<&str> {
        self.target_industry.as_deref()
    }

    pub fn career_level(&self) -> Option<CareerLevel> {
        self.career_level
    }

    pub fn requested_depth(&self) -> RequestedDepth {
        self.requested_depth
    }
}

/// Trims and lowercases free-text targeting so "Engineer " and "engineer"
/// share a cache entry. Blank strings collapse to `None`.
fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: RecommendationType,
    pub title: String,
    pub description: String,
    pub reasoning: String,
    pub impact: Impact,
    pub confidence: f32,
    pub before_example: Option<String>,
    pub after_example: Option<String>,
}

/// Where a returned set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTier {
    Tier1,
    Tier2,
    Fresh,
    /// Emergency fallback table; never cached.
    Degraded,
}

impl SourceTier {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceTier::Tier1 => "tier1",
            SourceTier::Tier2 => "tier2",
            SourceTier::Fresh => "fresh",
            SourceTier::Degraded => "degraded",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationSet {
    pub request_key: String,
    pub items: Vec<Recommendation>,
    pub generated_at: DateTime<Utc>,
    pub source_tier: SourceTier,
    pub provider_latency_ms: u64,
}

impl RecommendationSet {
    pub fn is_degraded(&self) -> bool {
        self.source_tier == SourceTier::Degraded
    }

    /// Same content, re-tagged with the tier it was served from.
    pub fn served_from(mut self, tier: SourceTier) -> Self {
        self.source_tier = tier;
        self
    }
}
