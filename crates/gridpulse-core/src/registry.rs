//! Configured sources with their breakers, quotas, and reliability windows.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use crate::circuit_breaker::{AttemptPermit, CircuitBreaker, CircuitBreakerConfig};
use crate::data_source::{FetchResult, SourceAdapter};
use crate::reliability::{self, Outcome, OutcomeWindow};
use crate::throttling::RequestQuota;
use crate::ProviderKind;

/// Immutable identity and call policy of one configured source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDescriptor {
    pub name: String,
    pub kind: ProviderKind,
    pub endpoint: String,
    /// Lower is preferred.
    pub priority: u32,
    #[serde(rename = "timeoutMs", serialize_with = "serialize_millis")]
    pub timeout: Duration,
    /// Cool-down escalation steps the breaker may accumulate.
    pub retry_budget: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests_per_minute: Option<u32>,
}

fn serialize_millis<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(value.as_millis().min(u128::from(u64::MAX)) as u64)
}

/// Why a configured source sat out a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    CircuitOpen,
    RateLimited,
}

/// A registered source and its mutable runtime state.
pub struct SourceEntry {
    descriptor: SourceDescriptor,
    adapter: Arc<dyn SourceAdapter>,
    breaker: Arc<CircuitBreaker>,
    quota: Option<RequestQuota>,
    window: Mutex<OutcomeWindow>,
}

impl SourceEntry {
    pub fn new(
        descriptor: SourceDescriptor,
        adapter: Arc<dyn SourceAdapter>,
        breaker: CircuitBreakerConfig,
        window_capacity: usize,
    ) -> Self {
        let breaker = CircuitBreakerConfig {
            max_backoff_steps: descriptor.retry_budget,
            ..breaker
        };

        Self {
            quota: RequestQuota::from_limit(descriptor.requests_per_minute),
            breaker: Arc::new(CircuitBreaker::new(descriptor.name.clone(), breaker)),
            window: Mutex::new(OutcomeWindow::new(window_capacity)),
            descriptor,
            adapter,
        }
    }

    pub fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn adapter(&self) -> &Arc<dyn SourceAdapter> {
        &self.adapter
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Copy of the source's recent outcomes.
    pub fn window(&self) -> OutcomeWindow {
        self.lock_window().clone()
    }

    fn record(&self, outcome: Outcome) {
        self.lock_window().push(outcome);
    }

    fn lock_window(&self) -> MutexGuard<'_, OutcomeWindow> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One source cleared to fetch this cycle.
pub struct Admission {
    pub entry: Arc<SourceEntry>,
    pub permit: AttemptPermit,
}

/// Result of admission for one cycle.
#[derive(Default)]
pub struct AdmissionPlan {
    pub admitted: Vec<Admission>,
    pub skipped: BTreeMap<String, SkipReason>,
}

/// Priority-ordered set of configured sources.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    entries: Vec<Arc<SourceEntry>>,
}

impl SourceRegistry {
    /// Orders entries by `(priority, name)`.
    pub fn new(entries: Vec<SourceEntry>) -> Self {
        let mut entries: Vec<Arc<SourceEntry>> = entries.into_iter().map(Arc::new).collect();
        entries.sort_by(|left, right| {
            (left.descriptor.priority, &left.descriptor.name)
                .cmp(&(right.descriptor.priority, &right.descriptor.name))
        });
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Arc<SourceEntry>] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&Arc<SourceEntry>> {
        self.entries.iter().find(|entry| entry.name() == name)
    }

    /// Claims a breaker permit, then a quota slot, for each source that may fetch this cycle.
    /// A source the breaker rejects never spends quota.
    pub fn admit_at(&self, now: Instant) -> AdmissionPlan {
        let mut plan = AdmissionPlan::default();

        for entry in &self.entries {
            let Some(permit) = entry.breaker.try_acquire_at(now) else {
                debug!(source = %entry.name(), "circuit open; skipping source");
                plan.skipped
                    .insert(entry.name().to_owned(), SkipReason::CircuitOpen);
                continue;
            };

            if let Some(quota) = &entry.quota {
                if !quota.try_acquire() {
                    permit.release();
                    debug!(source = %entry.name(), "request quota exhausted; skipping source");
                    plan.skipped
                        .insert(entry.name().to_owned(), SkipReason::RateLimited);
                    continue;
                }
            }

            plan.admitted.push(Admission {
                entry: Arc::clone(entry),
                permit,
            });
        }

        plan
    }

    /// Appends each result's outcome to its source's reliability window.
    pub fn record_results(&self, results: &[FetchResult]) {
        for result in results {
            if let Some(entry) = self.get(&result.source) {
                entry.record(Outcome::from_result(result));
            }
        }
    }

    /// Failure rate over every source's rolling window.
    pub fn recent_failure_rate(&self) -> f64 {
        let windows: Vec<OutcomeWindow> = self.entries.iter().map(|entry| entry.window()).collect();
        reliability::recent_failure_rate(&windows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::Backoff;
    use crate::data_source::{FetchError, FetchFuture};

    struct Unreachable(&'static str);

    impl SourceAdapter for Unreachable {
        fn name(&self) -> &str {
            self.0
        }

        fn kind(&self) -> ProviderKind {
            ProviderKind::Generic
        }

        fn fetch(&self, _timeout: Duration) -> FetchFuture<'_> {
            Box::pin(async { Err(FetchError::transport("unreachable")) })
        }
    }

    fn entry(name: &'static str, priority: u32, rpm: Option<u32>) -> SourceEntry {
        SourceEntry::new(
            SourceDescriptor {
                name: name.to_owned(),
                kind: ProviderKind::Generic,
                endpoint: format!("https://{name}.test"),
                priority,
                timeout: Duration::from_secs(1),
                retry_budget: 3,
                requests_per_minute: rpm,
            },
            Arc::new(Unreachable(name)),
            CircuitBreakerConfig {
                failure_threshold: 1,
                cooldown: Backoff::Fixed {
                    delay: Duration::from_secs(60),
                },
                max_backoff_steps: 0,
            },
            20,
        )
    }

    #[test]
    fn entries_are_ordered_by_priority_then_name() {
        let registry = SourceRegistry::new(vec![
            entry("zeta", 1, None),
            entry("alpha", 2, None),
            entry("beta", 1, None),
        ]);

        let names: Vec<&str> = registry.entries().iter().map(|e| e.name()).collect();
        assert_eq!(names, ["beta", "zeta", "alpha"]);
    }

    #[test]
    fn open_and_throttled_sources_are_skipped() {
        let registry = SourceRegistry::new(vec![entry("open", 1, None), entry("quota", 2, Some(1))]);
        let now = Instant::now();
        registry
            .get("open")
            .expect("registered")
            .breaker()
            .record_outcome_at(false, now);

        let first = registry.admit_at(now);
        assert_eq!(first.admitted.len(), 1);
        assert_eq!(first.skipped.get("open"), Some(&SkipReason::CircuitOpen));
        for admission in first.admitted {
            admission.permit.record_at(true, now);
        }

        let second = registry.admit_at(now);
        assert!(second.admitted.is_empty());
        assert_eq!(second.skipped.get("quota"), Some(&SkipReason::RateLimited));
        assert_eq!(
            registry.get("quota").expect("registered").breaker().consecutive_failures(),
            0
        );
    }

    #[test]
    fn open_circuit_does_not_spend_quota() {
        let registry = SourceRegistry::new(vec![entry("gated", 1, Some(1))]);
        let now = Instant::now();
        let breaker = registry.get("gated").expect("registered").breaker();
        breaker.record_outcome_at(false, now);

        let blocked = registry.admit_at(now);
        assert_eq!(blocked.skipped.get("gated"), Some(&SkipReason::CircuitOpen));

        let later = now + Duration::from_secs(60);
        let trial = registry.admit_at(later);
        assert_eq!(trial.admitted.len(), 1);
        assert!(trial.admitted[0].permit.is_trial());
    }

    #[test]
    fn throttled_trial_is_released_without_a_failure() {
        let registry = SourceRegistry::new(vec![entry("gated", 1, Some(1))]);
        let now = Instant::now();
        let first = registry.admit_at(now);
        for admission in first.admitted {
            admission.permit.record_at(false, now);
        }
        let breaker = registry.get("gated").expect("registered").breaker();
        assert_eq!(breaker.consecutive_failures(), 1);

        let later = now + Duration::from_secs(60);
        let throttled = registry.admit_at(later);
        assert!(throttled.admitted.is_empty());
        assert_eq!(throttled.skipped.get("gated"), Some(&SkipReason::RateLimited));
        assert_eq!(breaker.consecutive_failures(), 1);
        assert!(breaker.should_attempt_at(later));
    }

    #[test]
    fn retry_budget_caps_breaker_escalation() {
        let registry = SourceRegistry::new(vec![entry("capped", 1, None)]);
        let breaker = registry.get("capped").expect("registered").breaker();
        assert_eq!(breaker.config().max_backoff_steps, 3);
    }
}
