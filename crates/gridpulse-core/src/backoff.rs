//! Cool-down escalation for re-opened circuits.
//!
//! This is the only backoff policy in the engine. Adapters never retry and the orchestrator
//! never re-issues a fetch within a cycle; a failing source is retried only through the
//! breaker's half-open trial once the cool-down computed here has elapsed.

use std::time::Duration;

/// Delay schedule indexed by escalation step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Same delay at every step.
    Fixed {
        /// Delay for every step.
        delay: Duration,
    },
    /// `base * factor^step`, capped at `max`.
    Exponential {
        /// Step-zero delay.
        base: Duration,
        /// Multiplier applied per step.
        factor: f64,
        /// Upper bound for any step.
        max: Duration,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base: Duration::from_secs(60),
            factor: 2.0,
            max: Duration::from_secs(600),
        }
    }
}

impl Backoff {
    /// Builds the schedule from configuration; a multiplier of 1 degenerates to a fixed delay.
    pub fn from_multiplier(base: Duration, factor: f64, max: Duration) -> Self {
        if factor <= 1.0 {
            Self::Fixed {
                delay: base.min(max),
            }
        } else {
            Self::Exponential { base, factor, max }
        }
    }

    /// Step-zero delay.
    pub fn base(self) -> Duration {
        self.delay(0)
    }

    /// Delay for escalation `step` (0-based).
    pub fn delay(self, step: u32) -> Duration {
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential { base, factor, max } => {
                let exponent = i32::try_from(step).unwrap_or(i32::MAX);
                let seconds = base.as_secs_f64() * factor.powi(exponent);
                if !seconds.is_finite() || seconds >= max.as_secs_f64() {
                    max
                } else {
                    Duration::from_secs_f64(seconds)
                }
            }
        }
    }
}
