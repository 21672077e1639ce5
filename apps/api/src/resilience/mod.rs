// Upstream resilience primitives. Both are plain owned values: callers inject
// them where needed, there is no process-wide breaker or policy.

pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{
    BreakerConfig, BreakerSnapshot, CircuitBreaker, CircuitOpenError, Permit,
};
pub use retry::{RetryError, RetryPolicy, Transient};
