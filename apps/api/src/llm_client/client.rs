//! Resilient front door for upstream generation.
//!
//! Path per call: token budget guard → breaker check → retry loop over the
//! provider, reporting every attempt to the breaker. If the primary route is
//! open or exhausts its retries, the secondary route (if configured) gets the
//! simplified prompt.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::llm_client::{AiProvider, Prompt, ProviderError};
use crate::resilience::{
    BreakerConfig, CircuitBreaker, CircuitOpenError, Permit, RetryError, RetryPolicy, Transient,
};

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("estimated {estimated} tokens exceeds budget of {budget}")]
    TokenBudgetExceeded { estimated: u32, budget: u32 },

    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),

    #[error("{provider}: max retries exceeded after {attempts} attempts: {source}")]
    MaxRetriesExceeded {
        provider: &'static str,
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    #[error("{provider}: {source}")]
    Upstream {
        provider: &'static str,
        #[source]
        source: ProviderError,
    },
}

impl GenerationError {
    /// Whether a secondary provider should be tried after this failure.
    fn allows_failover(&self) -> bool {
        matches!(
            self,
            GenerationError::CircuitOpen(_) | GenerationError::MaxRetriesExceeded { .. }
        )
    }
}

/// The prompt in both forms the client may send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPair {
    pub full: Prompt,
    /// Shorter variant for the secondary provider.
    pub simplified: Prompt,
}

/// Raw provider output plus where it came from.
#[derive(Debug, Clone)]
pub struct Generated {
    pub text: String,
    pub provider: &'static str,
    pub used_fallback: bool,
    pub latency: Duration,
}

/// A provider together with the breaker tracking its health.
pub struct ProviderRoute {
    provider: Arc<dyn AiProvider>,
    breaker: Arc<CircuitBreaker>,
}

impl ProviderRoute {
    pub fn new(provider: Arc<dyn AiProvider>, breaker_config: BreakerConfig) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(provider.name(), breaker_config));
        Self { provider, breaker }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }
}

/// Error seen by the retry loop for a single attempt.
#[derive(Debug, Error)]
enum AttemptError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),
}

impl Transient for AttemptError {
    fn is_transient(&self) -> bool {
        match self {
            AttemptError::Provider(e) => e.is_transient(),
            AttemptError::CircuitOpen(_) => false,
        }
    }
}

pub struct AiClient {
    primary: ProviderRoute,
    secondary: Option<ProviderRoute>,
    retry: RetryPolicy,
}

impl AiClient {
    pub fn new(primary: ProviderRoute, secondary: Option<ProviderRoute>, retry: RetryPolicy) -> Self {
        Self {
            primary,
            secondary,
            retry,
        }
    }

    pub fn primary(&self) -> &ProviderRoute {
        &self.primary
    }

    pub fn secondary(&self) -> Option<&ProviderRoute> {
        self.secondary.as_ref()
    }

    pub async fn generate(
        &self,
        prompts: &PromptPair,
        token_budget: u32,
    ) -> Result<Generated, GenerationError> {
        let estimated = prompts.full.estimated_tokens();
        if estimated > token_budget {
            return Err(GenerationError::TokenBudgetExceeded {
                estimated,
                budget: token_budget,
            });
        }

        let started = Instant::now();
        let primary_error = match self.call_route(&self.primary, &prompts.full).await {
            Ok(text) => {
                return Ok(Generated {
                    text,
                    provider: self.primary.provider.name(),
                    used_fallback: false,
                    latency: started.elapsed(),
                })
            }
            Err(e) => e,
        };

        let secondary = match &self.secondary {
            Some(route) if primary_error.allows_failover() => route,
            _ => return Err(primary_error),
        };

        warn!(
            "Primary provider unavailable ({primary_error}, breaker {:?}), failing over to {}",
            self.primary.breaker.state(),
            secondary.provider.name()
        );
        let text = self.call_route(secondary, &prompts.simplified).await?;
        info!("Secondary provider {} served request", secondary.provider.name());
        Ok(Generated {
            text,
            provider: secondary.provider.name(),
            used_fallback: true,
            latency: started.elapsed(),
        })
    }

    async fn call_route(
        &self,
        route: &ProviderRoute,
        prompt: &Prompt,
    ) -> Result<String, GenerationError> {
        let breaker = &route.breaker;
        let provider = &route.provider;
        let mut first_permit = Some(breaker.check()?);

        let outcome = self
            .retry
            .execute(|_attempt| {
                let permit = first_permit.take();
                async move {
                    // Re-check before every retry so a breaker tripped mid-loop stops it.
                    let permit = match permit {
                        Some(p) => p,
                        None => breaker.check()?,
                    };
                    attempt(&**provider, breaker, permit, prompt).await
                }
            })
            .await;

        outcome.map_err(|e| match e {
            RetryError::Aborted(AttemptError::CircuitOpen(e))
            | RetryError::MaxRetriesExceeded {
                last: AttemptError::CircuitOpen(e),
                ..
            } => GenerationError::CircuitOpen(e),
            RetryError::Aborted(AttemptError::Provider(source)) => GenerationError::Upstream {
                provider: provider.name(),
                source,
            },
            RetryError::MaxRetriesExceeded {
                attempts,
                last: AttemptError::Provider(source),
            } => GenerationError::MaxRetriesExceeded {
                provider: provider.name(),
                attempts,
                source,
            },
        })
    }
}

/// One upstream call. Transient failures count against the breaker; a
/// non-transient error still proves the provider is answering.
async fn attempt(
    provider: &dyn AiProvider,
    breaker: &CircuitBreaker,
    permit: Permit,
    prompt: &Prompt,
) -> Result<String, AttemptError> {
    match provider.generate(prompt).await {
        Ok(text) => {
            breaker.record_success(permit);
            Ok(text)
        }
        Err(e) if e.is_transient() => {
            breaker.record_failure(permit);
            Err(e.into())
        }
        Err(e) => {
            breaker.record_success(permit);
            Err(e.into())
        }
    }
}
