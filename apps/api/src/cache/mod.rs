//! Multi-tier recommendation cache.
//!
//! Lookup goes fastest tier first. A hit in a slower tier is back-filled into
//! every faster tier so the next request on this process stays local.
//! Writes fan out to all tiers concurrently and are best-effort: a failing
//! tier is logged and skipped, never surfaced to the caller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::recommendation::{RecommendationRequest, RecommendationSet, SourceTier};

pub mod memory;
pub mod redis;

pub use memory::MemoryTier;
pub use self::redis::RedisTier;

const KEY_PREFIX: &str = "recs";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache operation timed out after {0:?}")]
    Timeout(Duration),
}

// ────────────────────────────────────────────────────────────────────────────
// Cache key
// ────────────────────────────────────────────────────────────────────────────

/// Content-addressed cache key: `recs:{subject_id}:{prompt_version}:{digest}`.
///
/// The digest covers every input that shapes the generated output, so an
/// edited CV (new content hash) or a new prompt template naturally misses.
/// The subject prefix exists only so a subject's entries can be bulk-invalidated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn derive(request: &RecommendationRequest, prompt_version: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        for component in [
            request.cv_content_hash(),
            request.target_role().unwrap_or(""),
            request.target_industry().unwrap_or(""),
            request.career_level().map(|l| l.as_str()).unwrap_or(""),
            request.requested_depth().as_str(),
            prompt_version,
        ] {
            // Length prefix keeps free-text parts from running into each other.
            hasher.update(&(component.len() as u64).to_le_bytes());
            hasher.update(component.as_bytes());
        }
        let digest = hasher.finalize();

        CacheKey(format!(
            "{KEY_PREFIX}:{}:{prompt_version}:{}",
            request.subject_id(),
            digest.to_hex()
        ))
    }

    /// Glob matching every key owned by `subject_id`, across prompt versions.
    pub fn subject_pattern(subject_id: Uuid) -> String {
        format!("{KEY_PREFIX}:{subject_id}:*")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tier trait
// ────────────────────────────────────────────────────────────────────────────

/// One level of the cache hierarchy. Implementations must be safe for
/// concurrent use and carry their own deadlines for remote I/O.
#[async_trait]
pub trait CacheTier: Send + Sync {
    /// The tag a hit from this tier carries.
    fn source(&self) -> SourceTier;

    async fn get(&self, key: &str) -> Result<Option<RecommendationSet>, CacheError>;

    async fn set(&self, key: &str, value: &RecommendationSet, ttl: Duration)
        -> Result<(), CacheError>;

    /// Removes every key matching a Redis-style glob `pattern` (`*` and `?`).
    /// Returns the number of removed entries.
    async fn invalidate(&self, pattern: &str) -> Result<u64, CacheError>;
}

/// Per-tier TTLs: short for the in-process tier, long for the shared one.
#[derive(Debug, Clone, Copy)]
pub struct TierTtls {
    pub tier1: Duration,
    pub tier2: Duration,
}

impl Default for TierTtls {
    fn default() -> Self {
        Self {
            tier1: Duration::from_secs(5 * 60),
            tier2: Duration::from_secs(30 * 60),
        }
    }
}

struct TierSlot {
    tier: Arc<dyn CacheTier>,
    ttl: Duration,
}

// ────────────────────────────────────────────────────────────────────────────
// Tiered cache
// ────────────────────────────────────────────────────────────────────────────

/// Ordered stack of tiers, fastest first.
pub struct TieredCache {
    tiers: Vec<TierSlot>,
}

impl TieredCache {
    /// The standard two-level layout: in-process tier-1 over shared tier-2.
    pub fn two_level(
        tier1: Arc<dyn CacheTier>,
        tier2: Arc<dyn CacheTier>,
        ttls: TierTtls,
    ) -> Self {
        Self {
            tiers: vec![
                TierSlot {
                    tier: tier1,
                    ttl: ttls.tier1,
                },
                TierSlot {
                    tier: tier2,
                    ttl: ttls.tier2,
                },
            ],
        }
    }

    /// Looks `key` up tier by tier. Tier errors count as misses.
    /// On a hit below tier-1 the value is back-filled into the faster tiers
    /// before returning.
    pub async fn get(&self, key: &CacheKey) -> Option<(RecommendationSet, SourceTier)> {
        for (index, slot) in self.tiers.iter().enumerate() {
            let source = slot.tier.source();
            match slot.tier.get(key.as_str()).await {
                Ok(Some(value)) => {
                    debug!("Cache hit in {} for {}", source.as_str(), key);
                    for faster in &self.tiers[..index] {
                        if let Err(e) = faster.tier.set(key.as_str(), &value, faster.ttl).await {
                            warn!(
                                "Back-fill into {} failed for {}: {e}",
                                faster.tier.source().as_str(),
                                key
                            );
                        }
                    }
                    return Some((value, source));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Cache read from {} failed for {}: {e}", source.as_str(), key);
                }
            }
        }
        None
    }

    /// Writes `value` to every tier concurrently with the tier's TTL.
    /// Returns how many tiers accepted the write.
    pub async fn set(&self, key: &CacheKey, value: &RecommendationSet) -> usize {
        let mut writes = JoinSet::new();
        for slot in &self.tiers {
            let tier = Arc::clone(&slot.tier);
            let ttl = slot.ttl;
            let key = key.as_str().to_string();
            let value = value.clone();
            writes.spawn(async move {
                let outcome = tier.set(&key, &value, ttl).await;
                (tier.source(), outcome)
            });
        }

        let mut written = 0;
        while let Some(joined) = writes.join_next().await {
            match joined {
                Ok((_, Ok(()))) => written += 1,
                Ok((source, Err(e))) => {
                    warn!("Cache write to {} failed for {}: {e}", source.as_str(), key);
                }
                Err(e) => warn!("Cache write task for {} aborted: {e}", key),
            }
        }
        written
    }

    /// Bulk invalidation across all tiers. Errors are logged per tier.
    pub async fn invalidate(&self, pattern: &str) -> u64 {
        let mut removed = 0;
        for slot in &self.tiers {
            match slot.tier.invalidate(pattern).await {
                Ok(n) => removed += n,
                Err(e) => warn!(
                    "Invalidation of '{pattern}' in {} failed: {e}",
                    slot.tier.source().as_str()
                ),
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::recommendation::{
        CareerLevel, Impact, Recommendation, RecommendationType, SubjectContext,
    };
    use chrono::Utc;
    use wildmatch::WildMatch;

    struct BrokenTier;

    #[async_trait]
    impl CacheTier for BrokenTier {
        fn source(&self) -> SourceTier {
            SourceTier::Tier2
        }

        async fn get(&self, _key: &str) -> Result<Option<RecommendationSet>, CacheError> {
            Err(CacheError::Timeout(Duration::from_millis(250)))
        }

        async fn set(
            &self,
            _key: &str,
            _value: &RecommendationSet,
            _ttl: Duration,
        ) -> Result<(), CacheError> {
            Err(CacheError::Timeout(Duration::from_millis(250)))
        }

        async fn invalidate(&self, _pattern: &str) -> Result<u64, CacheError> {
            Err(CacheError::Timeout(Duration::from_millis(250)))
        }
    }

    fn request(subject_id: Uuid, role: &str) -> RecommendationRequest {
        RecommendationRequest::new(
            SubjectContext {
                subject_id,
                premium: false,
            },
            "abc",
            Some(role.to_string()),
            None,
            Some(CareerLevel::Mid),
        )
    }

    fn sample_set(key: &CacheKey) -> RecommendationSet {
        RecommendationSet {
            request_key: key.to_string(),
            items: vec![Recommendation {
                id: Uuid::new_v4(),
                kind: RecommendationType::Keyword,
                title: "Mirror the job posting's keywords".to_string(),
                description: "Add missing skill keywords".to_string(),
                reasoning: "Applicant tracking systems rank on keyword overlap".to_string(),
                impact: Impact::High,
                confidence: 0.8,
                before_example: None,
                after_example: None,
            }],
            generated_at: Utc::now(),
            source_tier: SourceTier::Fresh,
            provider_latency_ms: 1200,
        }
    }

    fn memory_cache() -> (Arc<MemoryTier>, Arc<MemoryTier>, TieredCache) {
        let tier1 = Arc::new(MemoryTier::new(SourceTier::Tier1, 100));
        let tier2 = Arc::new(MemoryTier::new(SourceTier::Tier2, 100));
        let cache = TieredCache::two_level(tier1.clone(), tier2.clone(), TierTtls::default());
        (tier1, tier2, cache)
    }

    #[test]
    fn test_cache_key_is_deterministic() {
        let subject_id = Uuid::new_v4();
        let a = CacheKey::derive(&request(subject_id, "engineer"), "v1");
        let b = CacheKey::derive(&request(subject_id, "Engineer"), "v1");
        assert_eq!(a, b);
        assert!(a.as_str().starts_with(&format!("recs:{subject_id}:v1:")));
    }

    #[test]
    fn test_cache_key_changes_with_prompt_version_and_inputs() {
        let subject_id = Uuid::new_v4();
        let base = CacheKey::derive(&request(subject_id, "engineer"), "v1");
        assert_ne!(base, CacheKey::derive(&request(subject_id, "engineer"), "v2"));
        assert_ne!(base, CacheKey::derive(&request(subject_id, "designer"), "v1"));
    }

    #[test]
    fn test_subject_pattern_matches_only_that_subject() {
        let subject_id = Uuid::new_v4();
        let key = CacheKey::derive(&request(subject_id, "engineer"), "v1");
        let other = CacheKey::derive(&request(Uuid::new_v4(), "engineer"), "v1");
        let pattern = CacheKey::subject_pattern(subject_id);
        let matcher = WildMatch::new(&pattern);
        assert!(matcher.matches(key.as_str()));
        assert!(!matcher.matches(other.as_str()));
    }

    #[test]
    fn test_cache_key_parts_cannot_shift_across_fields() {
        let subject = SubjectContext {
            subject_id: Uuid::from_u128(7),
            premium: false,
        };
        let role_only = RecommendationRequest::new(
            subject,
            "abc",
            Some("a|b".to_string()),
            None,
            None,
        );
        let role_and_industry = RecommendationRequest::new(
            subject,
            "abc",
            Some("a".to_string()),
            Some("b|".to_string()),
            None,
        );
        assert_ne!(
            CacheKey::derive(&role_only, "v1"),
            CacheKey::derive(&role_and_industry, "v1")
        );

        let hash_in_role = RecommendationRequest::new(subject, "ab", Some("c".to_string()), None, None);
        let hash_whole = RecommendationRequest::new(subject, "abc", None, None, None);
        assert_ne!(
            CacheKey::derive(&hash_in_role, "v1"),
            CacheKey::derive(&hash_whole, "v1")
        );
    }

    #[tokio::test]
    async fn test_tier2_hit_backfills_tier1() {
        let (tier1, tier2, cache) = memory_cache();
        let key = CacheKey::derive(&request(Uuid::new_v4(), "engineer"), "v1");
        let value = sample_set(&key);
        tier2
            .set(key.as_str(), &value, Duration::from_secs(60))
            .await
            .unwrap();

        let (first, tier) = cache.get(&key).await.unwrap();
        assert_eq!(tier, SourceTier::Tier2);
        assert_eq!(first, value);
        assert!(tier1.get(key.as_str()).await.unwrap().is_some());

        let (_, tier) = cache.get(&key).await.unwrap();
        assert_eq!(tier, SourceTier::Tier1);
    }

    #[tokio::test]
    async fn test_set_writes_every_tier() {
        let (tier1, tier2, cache) = memory_cache();
        let key = CacheKey::derive(&request(Uuid::new_v4(), "engineer"), "v1");
        assert_eq!(cache.set(&key, &sample_set(&key)).await, 2);
        assert!(tier1.get(key.as_str()).await.unwrap().is_some());
        assert!(tier2.get(key.as_str()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_tier2_failures_are_tolerated() {
        let tier1 = Arc::new(MemoryTier::new(SourceTier::Tier1, 100));
        let cache = TieredCache::two_level(tier1.clone(), Arc::new(BrokenTier), TierTtls::default());
        let key = CacheKey::derive(&request(Uuid::new_v4(), "engineer"), "v1");

        assert!(cache.get(&key).await.is_none());
        assert_eq!(cache.set(&key, &sample_set(&key)).await, 1);
        let (_, tier) = cache.get(&key).await.unwrap();
        assert_eq!(tier, SourceTier::Tier1);
        assert_eq!(cache.invalidate("recs:*").await, 1);
    }

    #[tokio::test]
    async fn test_invalidate_by_subject_clears_all_tiers() {
        let (tier1, tier2, cache) = memory_cache();
        let subject_id = Uuid::new_v4();
        let mine = CacheKey::derive(&request(subject_id, "engineer"), "v1");
        let theirs = CacheKey::derive(&request(Uuid::new_v4(), "engineer"), "v1");
        cache.set(&mine, &sample_set(&mine)).await;
        cache.set(&theirs, &sample_set(&theirs)).await;

        let removed = cache.invalidate(&CacheKey::subject_pattern(subject_id)).await;
        assert_eq!(removed, 2);
        assert!(cache.get(&mine).await.is_none());
        assert!(tier1.get(theirs.as_str()).await.unwrap().is_some());
        assert!(tier2.get(theirs.as_str()).await.unwrap().is_some());
    }
}
