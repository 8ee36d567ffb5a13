//! Per-source circuit breaker.
//!
//! ```text
//!            failures >= threshold
//!   CLOSED ─────────────────────────▶ OPEN
//!     ▲                                │ cool-down elapsed
//!     │ trial ok                       ▼
//!     └──────────────────────────── HALF_OPEN ──trial fails──▶ OPEN (cool-down escalated)
//! ```
//!
//! Admission hands out an [`AttemptPermit`]; the permit is the only way an attempted fetch
//! reports back, and dropping it unrecorded counts as a failure. Each admitted attempt
//! therefore reaches the breaker exactly once, even when its task is abandoned at the
//! deadline or aborted.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::backoff::Backoff;
use crate::UtcDateTime;

/// Runtime circuit state for one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Circuit breaker thresholds and timers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    /// Cool-down schedule; step `n` applies after the `n`-th consecutive re-open.
    pub cooldown: Backoff,
    /// Highest escalation step (the source's retry budget).
    pub max_backoff_steps: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Backoff::default(),
            max_backoff_steps: 3,
        }
    }
}

/// Point-in-time view of a breaker for health reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitStatus {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub reopen_count: u32,
    pub last_failure: Option<UtcDateTime>,
    pub last_transition: Option<UtcDateTime>,
    /// Time left before an open circuit admits its trial call.
    pub cooldown_remaining: Option<Duration>,
}

#[derive(Debug)]
struct CircuitInner {
    state: CircuitState,
    consecutive_failures: u32,
    reopen_count: u32,
    opened_at: Option<Instant>,
    current_cooldown: Duration,
    trial_in_flight: bool,
    last_failure: Option<UtcDateTime>,
    last_transition: Option<UtcDateTime>,
}

/// Thread-safe circuit breaker guarding one source.
#[derive(Debug)]
pub struct CircuitBreaker {
    source: String,
    config: CircuitBreakerConfig,
    inner: Mutex<CircuitInner>,
}

impl CircuitBreaker {
    pub fn new(source: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            source: source.into(),
            config,
            inner: Mutex::new(CircuitInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                reopen_count: 0,
                opened_at: None,
                current_cooldown: config.cooldown.base(),
                trial_in_flight: false,
                last_failure: None,
                last_transition: None,
            }),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Whether a call would be admitted at `now`. Never mutates state.
    pub fn should_attempt_at(&self, now: Instant) -> bool {
        let inner = self.lock();
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => cooldown_elapsed(&inner, now),
            CircuitState::HalfOpen => !inner.trial_in_flight,
        }
    }

    pub fn should_attempt(&self) -> bool {
        self.should_attempt_at(Instant::now())
    }

    /// Admits one call, moving an expired open circuit to half-open and claiming its single
    /// trial slot. Returns `None` while the circuit rejects calls.
    pub fn try_acquire_at(self: &Arc<Self>, now: Instant) -> Option<AttemptPermit> {
        let mut inner = self.lock();
        let trial = match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open if cooldown_elapsed(&inner, now) => {
                inner.state = CircuitState::HalfOpen;
                inner.opened_at = None;
                inner.last_transition = Some(UtcDateTime::now());
                info!(source = %self.source, "circuit half-open; admitting trial call");
                true
            }
            CircuitState::Open => return None,
            CircuitState::HalfOpen if inner.trial_in_flight => return None,
            CircuitState::HalfOpen => true,
        };

        if trial {
            inner.trial_in_flight = true;
        }

        Some(AttemptPermit {
            breaker: Arc::clone(self),
            trial,
            recorded: false,
        })
    }

    pub fn try_acquire(self: &Arc<Self>) -> Option<AttemptPermit> {
        self.try_acquire_at(Instant::now())
    }

    /// Applies the outcome of one attempted call. Outcomes are serialized by the breaker lock.
    pub fn record_outcome_at(&self, success: bool, now: Instant) {
        let mut inner = self.lock();
        if success {
            self.record_success(&mut inner);
        } else {
            self.record_failure(&mut inner, now);
        }
    }

    pub fn record_outcome(&self, success: bool) {
        self.record_outcome_at(success, Instant::now());
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    pub fn status_at(&self, now: Instant) -> CircuitStatus {
        let inner = self.lock();
        let cooldown_remaining = match (inner.state, inner.opened_at) {
            (CircuitState::Open, Some(opened_at)) => {
                Some(match opened_at.checked_add(inner.current_cooldown) {
                    Some(reopens_at) => reopens_at.saturating_duration_since(now),
                    None => inner.current_cooldown,
                })
            }
            _ => None,
        };

        CircuitStatus {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            reopen_count: inner.reopen_count,
            last_failure: inner.last_failure,
            last_transition: inner.last_transition,
            cooldown_remaining,
        }
    }

    pub fn status(&self) -> CircuitStatus {
        self.status_at(Instant::now())
    }

    fn record_success(&self, inner: &mut CircuitInner) {
        if inner.state != CircuitState::Closed {
            inner.last_transition = Some(UtcDateTime::now());
            info!(source = %self.source, "circuit closed after successful trial");
        }

        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.reopen_count = 0;
        inner.opened_at = None;
        inner.current_cooldown = self.config.cooldown.base();
        inner.trial_in_flight = false;
    }

    fn record_failure(&self, inner: &mut CircuitInner, now: Instant) {
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.last_failure = Some(UtcDateTime::now());

        match inner.state {
            CircuitState::HalfOpen => {
                inner.reopen_count = inner.reopen_count.saturating_add(1);
                let step = inner.reopen_count.min(self.config.max_backoff_steps);
                inner.current_cooldown = self.config.cooldown.delay(step);
                inner.trial_in_flight = false;
                self.open(inner, now);
                warn!(
                    source = %self.source,
                    reopens = inner.reopen_count,
                    cooldown_ms = inner.current_cooldown.as_millis() as u64,
                    "trial call failed; circuit re-opened"
                );
            }
            CircuitState::Closed
                if inner.consecutive_failures >= self.config.failure_threshold =>
            {
                inner.current_cooldown = self.config.cooldown.base();
                self.open(inner, now);
                warn!(
                    source = %self.source,
                    failures = inner.consecutive_failures,
                    cooldown_ms = inner.current_cooldown.as_millis() as u64,
                    "failure threshold reached; circuit opened"
                );
            }
            // Late outcomes of calls admitted before the circuit opened only count.
            CircuitState::Closed | CircuitState::Open => {}
        }
    }

    fn release_trial(&self) {
        self.lock().trial_in_flight = false;
    }

    fn open(&self, inner: &mut CircuitInner, now: Instant) {
        inner.state = CircuitState::Open;
        inner.opened_at = Some(now);
        inner.last_transition = Some(UtcDateTime::now());
    }

    fn lock(&self) -> MutexGuard<'_, CircuitInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn cooldown_elapsed(inner: &CircuitInner, now: Instant) -> bool {
    match inner.opened_at {
        Some(opened_at) => opened_at
            .checked_add(inner.current_cooldown)
            .is_some_and(|reopens_at| now >= reopens_at),
        None => true,
    }
}

/// Admission ticket for one fetch attempt.
///
/// Report the outcome with [`AttemptPermit::record`]. A permit dropped without a recorded
/// outcome (abandoned at the deadline, aborted, or panicked) counts as a failure.
#[derive(Debug)]
pub struct AttemptPermit {
    breaker: Arc<CircuitBreaker>,
    trial: bool,
    recorded: bool,
}

impl AttemptPermit {
    /// Whether this attempt is the half-open trial call.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn source(&self) -> &str {
        self.breaker.source()
    }

    pub fn record(self, success: bool) {
        self.record_at(success, Instant::now());
    }

    pub fn record_at(mut self, success: bool, now: Instant) {
        self.recorded = true;
        self.breaker.record_outcome_at(success, now);
    }

    /// Hands the permit back unused. No outcome is recorded and a claimed trial slot is freed.
    pub fn release(mut self) {
        self.recorded = true;
        if self.trial {
            self.breaker.release_trial();
        }
    }
}

impl Drop for AttemptPermit {
    fn drop(&mut self) {
        if !self.recorded {
            self.breaker.record_outcome(false);
        }
    }
}
