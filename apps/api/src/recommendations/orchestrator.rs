//! Recommendation Orchestrator: the public entry point of the core.
//!
//! Flow per request:
//!   quota check → cache lookup → [miss] single-flight join →
//!   (leader only, in a background task) re-check cache → load CV →
//!   build prompts → AI client → validate → cache populate →
//!   publish to every waiter.
//!
//! Exhausted generation degrades to the static fallback table instead of
//! surfacing upstream errors. The request deadline bounds only the caller's
//! wait: the background generation keeps running and still fills the cache.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::{CacheKey, TieredCache};
use crate::collaborators::{
    CvContentStore, MetricsEvent, MetricsSink, Outcome, QuotaDecision, UsageLimiter,
};
use crate::llm_client::AiClient;
use crate::models::recommendation::{
    RecommendationRequest, RecommendationSet, RequestedDepth, SourceTier,
};
use crate::recommendations::fallback::FallbackTable;
use crate::recommendations::prompt_builder::build_prompts;
use crate::recommendations::prompts::PROMPT_VERSION;
use crate::recommendations::single_flight::SingleFlight;
use crate::recommendations::validator::{parse_recommendations, ValidationRules};
use crate::resilience::BreakerSnapshot;

/// Everything a caller of `get_recommendations` can observe besides a set.
#[derive(Debug, Clone, Error)]
pub enum RecommendationError {
    #[error("usage quota exceeded for subject {subject_id}: {reason}")]
    QuotaExceeded { subject_id: Uuid, reason: String },

    #[error("recommendation service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("request deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),
}

type FlightResult = Result<RecommendationSet, RecommendationError>;

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    pub request_deadline: Duration,
    /// Full generate → validate rounds before falling back.
    pub max_generation_attempts: u32,
    pub validation: ValidationRules,
    pub standard_token_budget: u32,
    pub deep_token_budget: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            request_deadline: Duration::from_secs(30),
            max_generation_attempts: 2,
            validation: ValidationRules::default(),
            standard_token_budget: 8_000,
            deep_token_budget: 16_000,
        }
    }
}

impl OrchestratorConfig {
    fn token_budget(&self, depth: RequestedDepth) -> u32 {
        match depth {
            RequestedDepth::Standard => self.standard_token_budget,
            RequestedDepth::Deep => self.deep_token_budget,
        }
    }
}

/// External collaborators the orchestrator consumes.
pub struct Collaborators {
    pub cv_store: Arc<dyn CvContentStore>,
    pub limiter: Arc<dyn UsageLimiter>,
    pub metrics: Arc<dyn MetricsSink>,
}

/// State shared with background generation tasks.
struct Core {
    cache: Arc<TieredCache>,
    client: Arc<AiClient>,
    cv_store: Arc<dyn CvContentStore>,
    fallback: FallbackTable,
    config: OrchestratorConfig,
}

pub struct RecommendationOrchestrator {
    core: Arc<Core>,
    limiter: Arc<dyn UsageLimiter>,
    metrics: Arc<dyn MetricsSink>,
    in_flight: Arc<SingleFlight<FlightResult>>,
}

impl RecommendationOrchestrator {
    pub fn new(
        cache: Arc<TieredCache>,
        client: Arc<AiClient>,
        fallback: FallbackTable,
        collaborators: Collaborators,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            core: Arc::new(Core {
                cache,
                client,
                cv_store: collaborators.cv_store,
                fallback,
                config,
            }),
            limiter: collaborators.limiter,
            metrics: collaborators.metrics,
            in_flight: Arc::new(SingleFlight::new()),
        }
    }

    /// Returns recommendations for `request`: cached, freshly generated, or
    /// degraded. Errors are limited to quota denial, deadline expiry, and a
    /// fallback table with nothing to offer.
    pub async fn get_recommendations(
        &self,
        request: RecommendationRequest,
    ) -> Result<RecommendationSet, RecommendationError> {
        let started = Instant::now();
        let key = CacheKey::derive(&request, PROMPT_VERSION);

        if let QuotaDecision::Denied { reason } = self.limiter.check(request.subject_id()).await {
            info!("Quota denied for subject {}: {reason}", request.subject_id());
            self.emit(&key, None, started, Outcome::QuotaDenied);
            return Err(RecommendationError::QuotaExceeded {
                subject_id: request.subject_id(),
                reason,
            });
        }

        let deadline = self.core.config.request_deadline;
        let result = match tokio::time::timeout(deadline, self.resolve(&key, request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Request for {key} exceeded {deadline:?}; generation continues in background");
                Err(RecommendationError::DeadlineExceeded(deadline))
            }
        };

        match &result {
            Ok(set) => {
                let outcome = match set.source_tier {
                    _ if set.is_degraded() => Outcome::Degraded,
                    SourceTier::Fresh => Outcome::Generated,
                    _ => Outcome::CacheHit,
                };
                self.emit(&key, Some(set.source_tier), started, outcome);
            }
            Err(RecommendationError::DeadlineExceeded(_)) => {
                self.emit(&key, None, started, Outcome::TimedOut)
            }
            Err(_) => self.emit(&key, None, started, Outcome::Unavailable),
        }
        result
    }

    /// Drops every cached set for `subject_id` from all tiers.
    pub async fn invalidate_subject(&self, subject_id: Uuid) -> u64 {
        let removed = self
            .core
            .cache
            .invalidate(&CacheKey::subject_pattern(subject_id))
            .await;
        info!("Invalidated {removed} cached recommendation sets for subject {subject_id}");
        removed
    }

    pub fn breakers(&self) -> Vec<BreakerSnapshot> {
        let client = &self.core.client;
        std::iter::once(client.primary())
            .chain(client.secondary())
            .map(|route| route.breaker().snapshot())
            .collect()
    }

    /// Generations currently running, one per distinct key.
    pub fn in_flight(&self) -> usize {
        self.in_flight.in_flight()
    }

    async fn resolve(&self, key: &CacheKey, request: RecommendationRequest) -> FlightResult {
        if let Some((set, tier)) = self.core.cache.get(key).await {
            return Ok(set.served_from(tier));
        }

        let (leader, waiter) = self.in_flight.join(key.as_str());
        match leader {
            Some(leader) => {
                let core = Arc::clone(&self.core);
                let key = key.clone();
                // Detached so a caller timing out does not cancel other waiters' result.
                tokio::spawn(async move {
                    let result = core.generate(&key, &request).await;
                    leader.complete(result);
                });
            }
            None => debug!("Attaching to in-flight generation for {key}"),
        }

        waiter.wait().await.unwrap_or_else(|| {
            Err(RecommendationError::ServiceUnavailable(
                "generation ended without a result".to_string(),
            ))
        })
    }

    fn emit(&self, key: &CacheKey, tier: Option<SourceTier>, started: Instant, outcome: Outcome) {
        self.metrics.record(MetricsEvent {
            key: key.to_string(),
            tier,
            latency_ms: started.elapsed().as_millis() as u64,
            outcome,
        });
    }
}

impl Core {
    async fn generate(&self, key: &CacheKey, request: &RecommendationRequest) -> FlightResult {
        // A flight for this key may have finished between our miss and our lead.
        if let Some((set, tier)) = self.cache.get(key).await {
            return Ok(set.served_from(tier));
        }

        let cv = match self
            .cv_store
            .fetch(request.subject_id(), request.cv_content_hash())
            .await
        {
            Ok(cv) => cv,
            Err(e) => {
                warn!("Cannot load CV for {key}: {e}");
                return self.emergency_fallback(key);
            }
        };

        let prompts = build_prompts(&cv, request);
        let budget = self.config.token_budget(request.requested_depth());
        let attempts = self.config.max_generation_attempts.max(1);

        for attempt in 1..=attempts {
            let generated = match self.client.generate(&prompts, budget).await {
                Ok(generated) => generated,
                // Budget refusals, open breakers and exhausted retries all end in fallback.
                Err(e) => {
                    warn!("Generation for {key} failed upstream: {e}");
                    break;
                }
            };

            match parse_recommendations(&generated.text, &self.config.validation) {
                Ok(items) => {
                    let set = RecommendationSet {
                        request_key: key.to_string(),
                        items,
                        generated_at: Utc::now(),
                        source_tier: SourceTier::Fresh,
                        provider_latency_ms: generated.latency.as_millis() as u64,
                    };
                    let tiers = self.cache.set(key, &set).await;
                    info!(
                        "Generated {} recommendations for {key} via {}{} in {}ms (cached in {tiers} tiers)",
                        set.items.len(),
                        generated.provider,
                        if generated.used_fallback { " (fallback)" } else { "" },
                        set.provider_latency_ms
                    );
                    return Ok(set);
                }
                Err(e) => {
                    warn!("Generation attempt {attempt}/{attempts} for {key} rejected: {e}");
                }
            }
        }

        self.emergency_fallback(key)
    }

    fn emergency_fallback(&self, key: &CacheKey) -> FlightResult {
        match self.fallback.degraded_set(key) {
            Some(set) => {
                warn!("Serving degraded fallback recommendations for {key}");
                Ok(set)
            }
            None => Err(RecommendationError::ServiceUnavailable(
                "generation failed and no fallback recommendations are configured".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheTier, MemoryTier, TierTtls};
    use crate::collaborators::{CvDocument, CvStoreError, InMemoryCvStore, UnmeteredLimiter};
    use crate::llm_client::{AiProvider, Prompt, ProviderError, ProviderRoute};
    use crate::models::recommendation::{Impact, RecommendationType, SubjectContext};
    use crate::recommendations::fallback::generic;
    use crate::resilience::circuit_breaker::CircuitState;
    use crate::resilience::{BreakerConfig, RetryPolicy};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    // ── Test doubles ────────────────────────────────────────────────────────

    fn payload(count: usize) -> String {
        let items: Vec<String> = (0..count)
            .map(|i| {
                format!(
                    r#"{{"type": "content", "title": "Quantify outcome number {i}",
                    "description": "Lead the bullet with the measurable result.",
                    "reasoning": "Reviewers look for evidence of impact first.",
                    "impact": "high", "confidence": 0.8}}"#
                )
            })
            .collect();
        format!("[{}]", items.join(","))
    }

    enum Reply {
        Text(String),
        Status(u16),
    }

    /// Counts calls; replays `replies` in order and repeats the last one.
    struct FakeProvider {
        replies: Mutex<Vec<Reply>>,
        delay: Duration,
        calls: AtomicU32,
    }

    impl FakeProvider {
        fn new(replies: Vec<Reply>) -> Arc<Self> {
            Self::slow(replies, Duration::ZERO)
        }

        fn slow(replies: Vec<Reply>, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
                delay,
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AiProvider for FakeProvider {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn generate(&self, _prompt: &Prompt) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let reply = {
                let mut replies = self.replies.lock().unwrap();
                if replies.len() > 1 {
                    replies.remove(0)
                } else {
                    match &replies[0] {
                        Reply::Text(t) => Reply::Text(t.clone()),
                        Reply::Status(s) => Reply::Status(*s),
                    }
                }
            };
            match reply {
                Reply::Text(text) => Ok(text),
                Reply::Status(status) => Err(ProviderError::Api {
                    status,
                    message: "fake".to_string(),
                }),
            }
        }
    }

    struct AnyCv;

    #[async_trait]
    impl CvContentStore for AnyCv {
        async fn fetch(&self, _subject_id: Uuid, content_hash: &str) -> Result<CvDocument, CvStoreError> {
            Ok(CvDocument {
                content_hash: content_hash.to_string(),
                content: "Jane Doe\nSoftware engineer, 6 years of Rust and Go.".to_string(),
            })
        }
    }

    struct DenyAll;

    #[async_trait]
    impl UsageLimiter for DenyAll {
        async fn check(&self, _subject_id: Uuid) -> QuotaDecision {
            QuotaDecision::Denied {
                reason: "monthly limit reached".to_string(),
            }
        }
    }

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<MetricsEvent>>);

    impl MetricsSink for RecordingSink {
        fn record(&self, event: MetricsEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    struct Harness {
        orchestrator: Arc<RecommendationOrchestrator>,
        provider: Arc<FakeProvider>,
        tier1: Arc<MemoryTier>,
        tier2: Arc<MemoryTier>,
        sink: Arc<RecordingSink>,
    }

    struct Setup {
        provider: Arc<FakeProvider>,
        fallback: FallbackTable,
        cv_store: Arc<dyn CvContentStore>,
        limiter: Arc<dyn UsageLimiter>,
        breaker: BreakerConfig,
        config: OrchestratorConfig,
    }

    impl Setup {
        fn new(provider: Arc<FakeProvider>) -> Self {
            Self {
                provider,
                fallback: FallbackTable::builtin(),
                cv_store: Arc::new(AnyCv),
                limiter: Arc::new(UnmeteredLimiter),
                breaker: BreakerConfig::default(),
                config: OrchestratorConfig::default(),
            }
        }

        fn build(self) -> Harness {
            let tier1 = Arc::new(MemoryTier::new(SourceTier::Tier1, 100));
            let tier2 = Arc::new(MemoryTier::new(SourceTier::Tier2, 100));
            let cache = Arc::new(TieredCache::two_level(
                tier1.clone(),
                tier2.clone(),
                TierTtls::default(),
            ));
            let retry = RetryPolicy {
                base_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(50),
                max_attempts: 3,
            };
            let client = Arc::new(AiClient::new(
                ProviderRoute::new(self.provider.clone(), self.breaker),
                None,
                retry,
            ));
            let sink = Arc::new(RecordingSink::default());
            let orchestrator = RecommendationOrchestrator::new(
                cache,
                client,
                self.fallback,
                Collaborators {
                    cv_store: self.cv_store,
                    limiter: self.limiter,
                    metrics: sink.clone(),
                },
                self.config,
            );
            Harness {
                orchestrator: Arc::new(orchestrator),
                provider: self.provider,
                tier1,
                tier2,
                sink,
            }
        }
    }

    fn request(cv_hash: &str, role: &str) -> RecommendationRequest {
        RecommendationRequest::new(
            SubjectContext {
                subject_id: Uuid::from_u128(42),
                premium: false,
            },
            cv_hash,
            Some(role.to_string()),
            None,
            None,
        )
    }

    fn outcomes(harness: &Harness) -> Vec<Outcome> {
        harness.sink.0.lock().unwrap().iter().map(|e| e.outcome).collect()
    }

    // ── Tests ───────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn test_fresh_generation_then_tier1_hit() {
        let h = Setup::new(FakeProvider::new(vec![Reply::Text(payload(2))])).build();

        let first = h
            .orchestrator
            .get_recommendations(request("abc", "engineer"))
            .await
            .unwrap();
        assert_eq!(first.source_tier, SourceTier::Fresh);
        assert!(!first.items.is_empty());

        let second = h
            .orchestrator
            .get_recommendations(request("abc", "engineer"))
            .await
            .unwrap();
        assert_eq!(second.source_tier, SourceTier::Tier1);
        assert_eq!(second.items, first.items);
        assert_eq!(second.generated_at, first.generated_at);
        assert_eq!(second.request_key, first.request_key);
        assert_eq!(h.provider.calls(), 1);
        assert_eq!(outcomes(&h), vec![Outcome::Generated, Outcome::CacheHit]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tier2_hit_is_backfilled_into_tier1() {
        let h = Setup::new(FakeProvider::new(vec![Reply::Text(payload(1))])).build();
        let first = h
            .orchestrator
            .get_recommendations(request("abc", "engineer"))
            .await
            .unwrap();
        // Simulate another process: this one's tier-1 lost the entry.
        h.tier1.invalidate("*").await.unwrap();

        let from_shared = h
            .orchestrator
            .get_recommendations(request("abc", "engineer"))
            .await
            .unwrap();
        assert_eq!(from_shared.source_tier, SourceTier::Tier2);

        let local = h
            .orchestrator
            .get_recommendations(request("abc", "engineer"))
            .await
            .unwrap();
        assert_eq!(local.source_tier, SourceTier::Tier1);
        assert_eq!(local.items, first.items);
        assert_eq!(h.provider.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_misses_share_one_generation() {
        let provider = FakeProvider::slow(
            vec![Reply::Text(payload(3))],
            Duration::from_millis(500),
        );
        let h = Setup::new(provider).build();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let orchestrator = h.orchestrator.clone();
            handles.push(tokio::spawn(async move {
                orchestrator
                    .get_recommendations(request("abc", "engineer"))
                    .await
            }));
        }

        let mut sets = Vec::new();
        for handle in handles {
            sets.push(handle.await.unwrap().unwrap());
        }
        assert_eq!(h.provider.calls(), 1);
        for set in &sets {
            assert_eq!(set.items, sets[0].items);
            assert_eq!(set.generated_at, sets[0].generated_at);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_failure() {
        let provider = FakeProvider::slow(vec![Reply::Status(503)], Duration::from_millis(200));
        let mut setup = Setup::new(provider);
        setup.fallback = FallbackTable::empty();
        let h = setup.build();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let orchestrator = h.orchestrator.clone();
            handles.push(tokio::spawn(async move {
                orchestrator
                    .get_recommendations(request("abc", "engineer"))
                    .await
            }));
        }

        for handle in handles {
            let err = handle.await.unwrap().unwrap_err();
            assert!(matches!(err, RecommendationError::ServiceUnavailable(_)));
        }
        // One flight: three retry attempts total, not three per caller.
        assert_eq!(h.provider.calls(), 3);
        assert_eq!(h.orchestrator.in_flight(), 0);
        assert_eq!(outcomes(&h), vec![Outcome::Unavailable; 8]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_response_is_rejected_regenerated_and_not_cached() {
        let h = Setup::new(FakeProvider::new(vec![
            Reply::Text("[]".to_string()),
            Reply::Text(payload(2)),
        ]))
        .build();

        let set = h
            .orchestrator
            .get_recommendations(request("abc", "engineer"))
            .await
            .unwrap();
        assert_eq!(set.source_tier, SourceTier::Fresh);
        assert_eq!(set.items.len(), 2);
        assert_eq!(h.provider.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistently_invalid_output_degrades_and_never_caches() {
        let h = Setup::new(FakeProvider::new(vec![Reply::Text("[]".to_string())])).build();

        let set = h
            .orchestrator
            .get_recommendations(request("abc", "engineer"))
            .await
            .unwrap();
        assert!(set.is_degraded());
        assert_eq!(h.provider.calls(), 2);

        let key = CacheKey::derive(&request("abc", "engineer"), PROMPT_VERSION);
        assert!(h.tier1.get(key.as_str()).await.unwrap().is_none());
        assert!(h.tier2.get(key.as_str()).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_return_exactly_the_fallback_entries() {
        let table = vec![
            generic(
                RecommendationType::Content,
                "Quantify your achievements",
                "Add numbers.",
                "Impact is what reviewers compare first.",
                Impact::High,
            ),
            generic(
                RecommendationType::Ats,
                "Use a simple layout",
                "Single column.",
                "Tracking systems mis-parse complex layouts.",
                Impact::High,
            ),
            generic(
                RecommendationType::Formatting,
                "Keep it to two pages",
                "Trim older roles.",
                "Long CVs dilute the strongest material.",
                Impact::Medium,
            ),
        ];
        let mut setup = Setup::new(FakeProvider::new(vec![Reply::Status(503)]));
        setup.fallback = FallbackTable::new(table.clone());
        let h = setup.build();

        let set = h
            .orchestrator
            .get_recommendations(request("abc", "engineer"))
            .await
            .unwrap();
        assert_eq!(set.source_tier, SourceTier::Degraded);
        assert_eq!(set.items, table);
        assert_eq!(outcomes(&h), vec![Outcome::Degraded]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_fallback_entries_means_service_unavailable() {
        let mut setup = Setup::new(FakeProvider::new(vec![Reply::Status(503)]));
        setup.fallback = FallbackTable::empty();
        let h = setup.build();

        let err = h
            .orchestrator
            .get_recommendations(request("abc", "engineer"))
            .await
            .unwrap_err();
        assert!(matches!(err, RecommendationError::ServiceUnavailable(_)));
        assert_eq!(outcomes(&h), vec![Outcome::Unavailable]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_cv_hash_degrades_without_upstream_call() {
        let mut setup = Setup::new(FakeProvider::new(vec![Reply::Text(payload(2))]));
        setup.cv_store = Arc::new(InMemoryCvStore::new());
        let h = setup.build();

        let set = h
            .orchestrator
            .get_recommendations(request("no-such-hash", "engineer"))
            .await
            .unwrap();
        assert_eq!(set.source_tier, SourceTier::Degraded);
        assert_eq!(h.provider.calls(), 0);
        assert_eq!(outcomes(&h), vec![Outcome::Degraded]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quota_denial_skips_cache_and_provider() {
        let mut setup = Setup::new(FakeProvider::new(vec![Reply::Text(payload(1))]));
        setup.limiter = Arc::new(DenyAll);
        let h = setup.build();

        let key = CacheKey::derive(&request("abc", "engineer"), PROMPT_VERSION);
        let cached = FallbackTable::builtin().degraded_set(&key).unwrap();
        h.tier1
            .set(key.as_str(), &cached, Duration::from_secs(60))
            .await
            .unwrap();

        let err = h
            .orchestrator
            .get_recommendations(request("abc", "engineer"))
            .await
            .unwrap_err();
        assert!(matches!(err, RecommendationError::QuotaExceeded { .. }));
        assert_eq!(h.provider.calls(), 0);
        assert_eq!(outcomes(&h), vec![Outcome::QuotaDenied]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_degrades_without_upstream_call() {
        let mut setup = Setup::new(FakeProvider::new(vec![Reply::Status(503)]));
        setup.breaker = BreakerConfig {
            failure_threshold: 3,
            ..BreakerConfig::default()
        };
        let h = setup.build();

        // Three attempts of one request trip the breaker.
        let set = h
            .orchestrator
            .get_recommendations(request("abc", "engineer"))
            .await
            .unwrap();
        assert!(set.is_degraded());
        assert_eq!(h.provider.calls(), 3);
        assert_eq!(h.orchestrator.breakers()[0].state, CircuitState::Open);

        let set = h
            .orchestrator
            .get_recommendations(request("def", "engineer"))
            .await
            .unwrap();
        assert!(set.is_degraded());
        assert_eq!(h.provider.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_returns_error_but_generation_fills_cache() {
        let provider = FakeProvider::slow(vec![Reply::Text(payload(1))], Duration::from_secs(45));
        let h = Setup::new(provider).build();

        let err = h
            .orchestrator
            .get_recommendations(request("abc", "engineer"))
            .await
            .unwrap_err();
        assert!(matches!(err, RecommendationError::DeadlineExceeded(_)));

        tokio::time::sleep(Duration::from_secs(20)).await;

        let set = h
            .orchestrator
            .get_recommendations(request("abc", "engineer"))
            .await
            .unwrap();
        assert_eq!(set.source_tier, SourceTier::Tier1);
        assert_eq!(h.provider.calls(), 1);
        assert_eq!(outcomes(&h), vec![Outcome::TimedOut, Outcome::CacheHit]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_budget_guard_degrades_without_call() {
        let mut setup = Setup::new(FakeProvider::new(vec![Reply::Text(payload(1))]));
        setup.config.standard_token_budget = 100;
        let h = setup.build();

        let set = h
            .orchestrator
            .get_recommendations(request("abc", "engineer"))
            .await
            .unwrap();
        assert!(set.is_degraded());
        assert_eq!(h.provider.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_changed_cv_misses_and_subject_invalidation_clears() {
        let h = Setup::new(FakeProvider::new(vec![Reply::Text(payload(1))])).build();
        h.orchestrator
            .get_recommendations(request("abc", "engineer"))
            .await
            .unwrap();
        h.orchestrator
            .get_recommendations(request("abc-edited", "engineer"))
            .await
            .unwrap();
        assert_eq!(h.provider.calls(), 2);

        let removed = h.orchestrator.invalidate_subject(Uuid::from_u128(42)).await;
        assert_eq!(removed, 4);

        let set = h
            .orchestrator
            .get_recommendations(request("abc", "engineer"))
            .await
            .unwrap();
        assert_eq!(set.source_tier, SourceTier::Fresh);
        assert_eq!(h.provider.calls(), 3);
    }
}
