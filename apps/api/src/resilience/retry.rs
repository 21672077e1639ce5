use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tracing::warn;

/// Classifies an error as worth retrying (timeouts, 5xx, 429) or not.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

#[derive(Debug, Error)]
pub enum RetryError<E: std::error::Error + 'static> {
    /// A non-transient error; returned on first occurrence.
    #[error(transparent)]
    Aborted(E),

    #[error("max retries exceeded after {attempts} attempts: {last}")]
    MaxRetriesExceeded {
        attempts: u32,
        #[source]
        last: E,
    },
}

/// Exponential backoff with additive jitter:
/// `delay = min(base_delay * 2^attempt, max_delay) + rand(0..=base_delay)`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// Runs `op` until it succeeds, fails non-transiently, or `max_attempts`
    /// is used up. `op` receives the zero-based attempt index.
    pub async fn execute<T, E, F, Fut>(&self, mut op: F) -> Result<T, RetryError<E>>
    where
        E: std::error::Error + Transient + 'static,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => return Err(RetryError::Aborted(e)),
                Err(e) => {
                    if attempt + 1 >= max_attempts {
                        return Err(RetryError::MaxRetriesExceeded {
                            attempts: max_attempts,
                            last: e,
                        });
                    }
                    let delay = self.backoff(attempt);
                    warn!(
                        "Attempt {}/{} failed ({e}), retrying after {}ms",
                        attempt + 1,
                        max_attempts,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay
            .checked_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX))
            .unwrap_or(self.max_delay);
        let capped = exponential.min(self.max_delay);

        let base_ms = self.base_delay.as_millis() as u64;
        let jitter = if base_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=base_ms)
        };
        capped + Duration::from_millis(jitter)
    }
}
