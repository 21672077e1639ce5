use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::cache::TierTtls;
use crate::recommendations::validator::ValidationRules;
use crate::recommendations::OrchestratorConfig;
use crate::resilience::{BreakerConfig, RetryPolicy};

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or a knob does not parse.
#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    pub anthropic_api_key: String,
    pub port: u16,
    pub rust_log: String,
    pub enable_fallback_provider: bool,

    pub breaker_failure_threshold: u32,
    pub breaker_window_secs: u64,
    pub breaker_reset_timeout_secs: u64,

    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub retry_max_attempts: u32,
    pub provider_timeout_secs: u64,

    pub tier1_ttl_secs: u64,
    pub tier1_max_entries: u64,
    pub tier2_ttl_secs: u64,
    pub tier2_timeout_ms: u64,

    pub request_deadline_secs: u64,
    pub max_generation_attempts: u32,
    pub min_recommendations: usize,
    pub standard_token_budget: u32,
    pub deep_token_budget: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            redis_url: require_env("REDIS_URL")?,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            port: env_or("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            enable_fallback_provider: env_or("ENABLE_FALLBACK_PROVIDER", true)?,

            breaker_failure_threshold: env_or("BREAKER_FAILURE_THRESHOLD", 5)?,
            breaker_window_secs: env_or("BREAKER_WINDOW_SECS", 60)?,
            breaker_reset_timeout_secs: env_or("BREAKER_RESET_TIMEOUT_SECS", 60)?,

            retry_base_delay_ms: env_or("RETRY_BASE_DELAY_MS", 1_000)?,
            retry_max_delay_ms: env_or("RETRY_MAX_DELAY_MS", 10_000)?,
            retry_max_attempts: env_or("RETRY_MAX_ATTEMPTS", 3)?,
            provider_timeout_secs: env_or("PROVIDER_TIMEOUT_SECS", 25)?,

            tier1_ttl_secs: env_or("TIER1_TTL_SECS", 300)?,
            tier1_max_entries: env_or("TIER1_MAX_ENTRIES", 10_000)?,
            tier2_ttl_secs: env_or("TIER2_TTL_SECS", 1_800)?,
            tier2_timeout_ms: env_or("TIER2_TIMEOUT_MS", 250)?,

            request_deadline_secs: env_or("REQUEST_DEADLINE_SECS", 30)?,
            max_generation_attempts: env_or("MAX_GENERATION_ATTEMPTS", 2)?,
            min_recommendations: env_or("MIN_RECOMMENDATIONS", 1)?,
            standard_token_budget: env_or("STANDARD_TOKEN_BUDGET", 8_000)?,
            deep_token_budget: env_or("DEEP_TOKEN_BUDGET", 16_000)?,
        })
    }

    pub fn breaker(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.breaker_failure_threshold,
            window: Duration::from_secs(self.breaker_window_secs),
            reset_timeout: Duration::from_secs(self.breaker_reset_timeout_secs),
        }
    }

    pub fn retry(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            max_attempts: self.retry_max_attempts,
        }
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn tier_ttls(&self) -> TierTtls {
        TierTtls {
            tier1: Duration::from_secs(self.tier1_ttl_secs),
            tier2: Duration::from_secs(self.tier2_ttl_secs),
        }
    }

    pub fn tier2_timeout(&self) -> Duration {
        Duration::from_millis(self.tier2_timeout_ms)
    }

    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            request_deadline: Duration::from_secs(self.request_deadline_secs),
            max_generation_attempts: self.max_generation_attempts,
            validation: ValidationRules {
                min_recommendations: self.min_recommendations,
                ..ValidationRules::default()
            },
            standard_token_budget: self.standard_token_budget,
            deep_token_budget: self.deep_token_budget,
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .with_context(|| format!("Environment variable '{key}' has invalid value '{raw}'"))
}
