use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::debug;

use crate::cache::{CacheError, CacheTier};
use crate::models::recommendation::{RecommendationSet, SourceTier};

const SCAN_BATCH: usize = 200;

/// Shared tier backed by Redis. Values are stored as JSON with `SET .. EX`.
/// Every round-trip is bounded by `op_timeout`; a slow Redis degrades to a
/// cache miss rather than stalling the request.
#[derive(Clone)]
pub struct RedisTier {
    conn: ConnectionManager,
    op_timeout: Duration,
}

impl RedisTier {
    pub async fn connect(client: redis::Client, op_timeout: Duration) -> Result<Self, CacheError> {
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn, op_timeout })
    }

    async fn bounded<T, F>(&self, op: F) -> Result<T, CacheError>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.op_timeout, op).await {
            Ok(result) => result.map_err(CacheError::from),
            Err(_) => Err(CacheError::Timeout(self.op_timeout)),
        }
    }
}

#[async_trait]
impl CacheTier for RedisTier {
    fn source(&self) -> SourceTier {
        SourceTier::Tier2
    }

    async fn get(&self, key: &str) -> Result<Option<RecommendationSet>, CacheError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = self
            .bounded(redis::cmd("GET").arg(key).query_async(&mut conn))
            .await?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: &RecommendationSet,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let json = serde_json::to_string(value)?;
        let seconds = ttl.as_secs().max(1);
        let mut conn = self.conn.clone();
        self.bounded::<(), _>(
            redis::cmd("SET")
                .arg(key)
                .arg(json)
                .arg("EX")
                .arg(seconds)
                .query_async(&mut conn),
        )
        .await
    }

    async fn invalidate(&self, pattern: &str) -> Result<u64, CacheError> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = self
                .bounded(
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(SCAN_BATCH)
                        .query_async(&mut conn),
                )
                .await?;

            if !keys.is_empty() {
                let deleted: u64 = self
                    .bounded(redis::cmd("DEL").arg(&keys).query_async(&mut conn))
                    .await?;
                removed += deleted;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!("Removed {removed} Redis keys matching '{pattern}'");
        Ok(removed)
    }
}
