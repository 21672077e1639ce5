//! Emergency fallback table: generic, industry-agnostic advice returned when
//! generation is impossible. Sets built from it are tagged `Degraded` and are
//! never written to the cache.

use chrono::Utc;
use uuid::Uuid;

use crate::cache::CacheKey;
use crate::models::recommendation::{
    Impact, Recommendation, RecommendationSet, RecommendationType, SourceTier,
};

pub struct FallbackTable {
    entries: Vec<Recommendation>,
}

impl FallbackTable {
    pub fn new(entries: Vec<Recommendation>) -> Self {
        Self { entries }
    }

    #[cfg(test)]
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// The advice that holds for almost any CV.
    pub fn builtin() -> Self {
        Self::new(vec![
            generic(
                RecommendationType::Content,
                "Quantify your achievements",
                "Rewrite experience bullets to lead with measurable results: numbers, percentages, time or money saved.",
                "Hiring managers compare candidates on demonstrated impact; duties without outcomes are easy to skip.",
                Impact::High,
            ),
            generic(
                RecommendationType::Ats,
                "Use a single-column, text-based layout",
                "Avoid tables, text boxes, images and headers/footers for key information; use standard section headings.",
                "Applicant tracking systems often mis-parse complex layouts, dropping content before a human reads it.",
                Impact::High,
            ),
            generic(
                RecommendationType::Keyword,
                "Mirror the language of the job posting",
                "Include the exact skill and tool names used in the postings you target, where they truthfully apply.",
                "Both automated screens and recruiters match on the posting's terminology.",
                Impact::Medium,
            ),
            generic(
                RecommendationType::Structure,
                "Open with a focused professional summary",
                "Add two or three lines at the top stating your role, years of experience and strongest specialty.",
                "Reviewers decide within seconds whether to keep reading; a summary frames everything below it.",
                Impact::Medium,
            ),
        ])
    }

    /// A degraded set containing every table entry, or `None` if the table is empty.
    pub fn degraded_set(&self, key: &CacheKey) -> Option<RecommendationSet> {
        if self.entries.is_empty() {
            return None;
        }
        Some(RecommendationSet {
            request_key: key.to_string(),
            items: self.entries.clone(),
            generated_at: Utc::now(),
            source_tier: SourceTier::Degraded,
            provider_latency_ms: 0,
        })
    }
}

pub(crate) fn generic(
    kind: RecommendationType,
    title: &str,
    description: &str,
    reasoning: &str,
    impact: Impact,
) -> Recommendation {
    Recommendation {
        id: Uuid::new_v4(),
        kind,
        title: title.to_string(),
        description: description.to_string(),
        reasoning: reasoning.to_string(),
        impact,
        confidence: 0.5,
        before_example: None,
        after_example: None,
    }
}
