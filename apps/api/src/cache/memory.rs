use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use wildmatch::WildMatch;

use crate::cache::{CacheError, CacheTier};
use crate::models::recommendation::{RecommendationSet, SourceTier};

struct Entry {
    value: RecommendationSet,
    ttl: Duration,
}

/// Expires each entry after the TTL it was written with, so back-fills and
/// fresh writes can carry different lifetimes in the same tier.
struct PerEntryTtl;

impl Expiry<String, Arc<Entry>> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Arc<Entry>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Arc<Entry>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process tier backed by a bounded moka cache.
pub struct MemoryTier {
    source: SourceTier,
    inner: Cache<String, Arc<Entry>>,
}

impl MemoryTier {
    pub fn new(source: SourceTier, max_entries: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(PerEntryTtl)
            .build();
        Self { source, inner }
    }
}

#[async_trait]
impl CacheTier for MemoryTier {
    fn source(&self) -> SourceTier {
        self.source
    }

    async fn get(&self, key: &str) -> Result<Option<RecommendationSet>, CacheError> {
        Ok(self.inner.get(key).await.map(|entry| entry.value.clone()))
    }

    async fn set(
        &self,
        key: &str,
        value: &RecommendationSet,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let entry = Arc::new(Entry {
            value: value.clone(),
            ttl,
        });
        self.inner.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn invalidate(&self, pattern: &str) -> Result<u64, CacheError> {
        let matcher = WildMatch::new(pattern);
        let matching: Vec<Arc<String>> = self
            .inner
            .iter()
            .filter(|(key, _)| matcher.matches(key))
            .map(|(key, _)| key)
            .collect();

        for key in &matching {
            self.inner.invalidate(key.as_str()).await;
        }
        Ok(matching.len() as u64)
    }
}
