//! Circuit breaker guarding calls to an upstream AI provider.
//!
//! ```text
//! Closed   → Open:     failures within `window` reach `failure_threshold`
//! Open     → HalfOpen: `reset_timeout` elapsed since the breaker opened
//! HalfOpen → Closed:   the single probe succeeds
//! HalfOpen → Open:     the single probe fails
//! ```
//!
//! All state lives behind one mutex and is only mutated inside this module.
//! Callers take a [`Permit`] before calling upstream and hand it back with
//! the outcome of each attempt.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Error)]
#[error("circuit '{name}' is open; upstream calls are suspended")]
pub struct CircuitOpenError {
    pub name: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub window: Duration,
    pub reset_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            window: Duration::from_secs(60),
            reset_timeout: Duration::from_secs(60),
        }
    }
}

/// Proof that the breaker admitted a call. Only the current probe permit
/// (matching id) can move a half-open breaker; superseded probes are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permit {
    Normal,
    Probe(u64),
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    /// Failure timestamps inside the sliding window while closed.
    failures: VecDeque<Instant>,
    last_failure_time: Option<Instant>,
    opened_at: Option<Instant>,
    last_probe_time: Option<Instant>,
    probe_in_flight: bool,
    /// Id of the most recently issued probe permit.
    probe_seq: u64,
}

/// Snapshot for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub name: &'static str,
    pub state: CircuitState,
    pub failure_count: usize,
}

pub struct CircuitBreaker {
    name: &'static str,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, config: BreakerConfig) -> Self {
        Self {
            name,
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: VecDeque::new(),
                last_failure_time: None,
                opened_at: None,
                last_probe_time: None,
                probe_in_flight: false,
                probe_seq: 0,
            }),
        }
    }

    /// Asks to call upstream. Fails fast while open and while a half-open
    /// probe is already out; never blocks.
    pub fn check(&self) -> Result<Permit, CircuitOpenError> {
        let now = Instant::now();
        let mut inner = self.lock();

        if inner.state == CircuitState::Open {
            let reopened = inner.opened_at.unwrap_or(now);
            if now.duration_since(reopened) < self.config.reset_timeout {
                return Err(self.open_error());
            }
            inner.state = CircuitState::HalfOpen;
            inner.probe_in_flight = false;
            info!("Circuit '{}' half-open, admitting one probe", self.name);
        }

        match inner.state {
            CircuitState::Closed => Ok(Permit::Normal),
            CircuitState::HalfOpen => {
                // A probe that never reported back is superseded after reset_timeout.
                let stale = inner
                    .last_probe_time
                    .map(|t| now.duration_since(t) >= self.config.reset_timeout)
                    .unwrap_or(true);
                if inner.probe_in_flight && !stale {
                    return Err(self.open_error());
                }
                inner.probe_in_flight = true;
                inner.last_probe_time = Some(now);
                inner.probe_seq += 1;
                Ok(Permit::Probe(inner.probe_seq))
            }
            CircuitState::Open => Err(self.open_error()),
        }
    }

    pub fn record_success(&self, permit: Permit) {
        let mut inner = self.lock();
        match (inner.state, permit) {
            (CircuitState::Closed, _) => inner.failures.clear(),
            (CircuitState::HalfOpen, Permit::Probe(id)) if id == inner.probe_seq => {
                inner.state = CircuitState::Closed;
                inner.failures.clear();
                inner.probe_in_flight = false;
                inner.opened_at = None;
                info!("Circuit '{}' closed after successful probe", self.name);
            }
            // Late results from calls admitted before the trip, or from a
            // probe that has since been superseded.
            _ => {}
        }
    }

    pub fn record_failure(&self, permit: Permit) {
        let now = Instant::now();
        let mut inner = self.lock();
        inner.last_failure_time = Some(now);

        match (inner.state, permit) {
            (CircuitState::Closed, _) => {
                let window = self.config.window;
                while let Some(oldest) = inner.failures.front() {
                    if now.duration_since(*oldest) > window {
                        inner.failures.pop_front();
                    } else {
                        break;
                    }
                }
                inner.failures.push_back(now);

                if inner.failures.len() >= self.config.failure_threshold as usize {
                    warn!(
                        "Circuit '{}' opened after {} failures within {:?}",
                        self.name,
                        inner.failures.len(),
                        window
                    );
                    self.trip(&mut inner, now);
                }
            }
            (CircuitState::HalfOpen, Permit::Probe(id)) if id == inner.probe_seq => {
                warn!("Circuit '{}' probe failed, reopening", self.name);
                self.trip(&mut inner, now);
            }
            _ => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            name: self.name,
            state: inner.state,
            failure_count: inner.failures.len(),
        }
    }

    fn trip(&self, inner: &mut Inner, now: Instant) {
        inner.state = CircuitState::Open;
        inner.opened_at = Some(now);
        inner.probe_in_flight = false;
        inner.failures.clear();
    }

    fn open_error(&self) -> CircuitOpenError {
        CircuitOpenError { name: self.name }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // State stays consistent even if a holder panicked: every mutation is
        // a complete assignment.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
