//! Reliability scoring.
//!
//! ```text
//! reliabilityScore = round(100 * sourcesUsed / sourcesConfigured * (1 - recentFailureRate))
//! successRate      = round(100 * sourcesUsed / sourcesAttempted)
//! ```
//!
//! `recentFailureRate` is failures over attempts across every source's rolling window,
//! sampled after the current cycle's outcomes have been recorded. Both scores are clamped
//! to `[0, 100]`; with no configured or no attempted sources the respective score is 0.

use std::collections::{BTreeMap, VecDeque};

use crate::data_source::{FetchErrorKind, FetchResult};

/// Default number of attempts remembered per source.
pub const DEFAULT_WINDOW: usize = 20;

/// One remembered fetch outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failed(FetchErrorKind),
}

impl Outcome {
    pub fn from_result(result: &FetchResult) -> Self {
        match result.error_kind() {
            None => Self::Success,
            Some(kind) => Self::Failed(kind),
        }
    }
}

/// Bounded history of a single source's most recent attempts.
#[derive(Debug, Clone)]
pub struct OutcomeWindow {
    capacity: usize,
    outcomes: VecDeque<Outcome>,
}

impl Default for OutcomeWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl OutcomeWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            outcomes: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, outcome: Outcome) {
        if self.outcomes.len() == self.capacity {
            self.outcomes.pop_front();
        }
        self.outcomes.push_back(outcome);
    }

    pub fn attempts(&self) -> usize {
        self.outcomes.len()
    }

    pub fn failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome, Outcome::Failed(_)))
            .count()
    }

    /// Success share of the window, `None` before the first attempt.
    pub fn success_rate(&self) -> Option<f64> {
        if self.outcomes.is_empty() {
            return None;
        }
        Some((self.attempts() - self.failures()) as f64 / self.attempts() as f64)
    }

    /// Failure counts by kind, for diagnostics.
    pub fn error_counts(&self) -> BTreeMap<FetchErrorKind, usize> {
        let mut counts = BTreeMap::new();
        for outcome in &self.outcomes {
            if let Outcome::Failed(kind) = outcome {
                *counts.entry(*kind).or_insert(0) += 1;
            }
        }
        counts
    }
}

/// Aggregated failure rate over several windows; 0 when nothing has been attempted.
pub fn recent_failure_rate<'a>(windows: impl IntoIterator<Item = &'a OutcomeWindow>) -> f64 {
    let (attempts, failures) = windows
        .into_iter()
        .fold((0usize, 0usize), |(attempts, failures), window| {
            (attempts + window.attempts(), failures + window.failures())
        });

    if attempts == 0 {
        0.0
    } else {
        failures as f64 / attempts as f64
    }
}

pub fn reliability_score(sources_used: usize, sources_configured: usize, failure_rate: f64) -> u8 {
    if sources_configured == 0 {
        return 0;
    }

    let coverage = sources_used.min(sources_configured) as f64 / sources_configured as f64;
    let failure_rate = if failure_rate.is_finite() {
        failure_rate.clamp(0.0, 1.0)
    } else {
        1.0
    };
    to_percent(coverage * (1.0 - failure_rate))
}

pub fn success_rate(sources_used: usize, sources_attempted: usize) -> u8 {
    if sources_attempted == 0 {
        return 0;
    }
    to_percent(sources_used.min(sources_attempted) as f64 / sources_attempted as f64)
}

fn to_percent(fraction: f64) -> u8 {
    (fraction * 100.0).round().clamp(0.0, 100.0) as u8
}
