//! Concurrent fetch fan-out bounded by a global deadline.
//!
//! Every admitted source gets its own task. A task races the adapter against
//! `min(start + source timeout, start + global deadline)` and reports through its breaker
//! permit before returning, so breaker accounting never depends on the collector. The
//! collector stops waiting at the global deadline plus a small grace margin, aborts whatever
//! is still running, and fills in a timeout result for each straggler.

use std::collections::BTreeSet;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info_span, warn, Instrument};

use crate::data_source::{FetchError, FetchResult};
use crate::registry::Admission;

/// Cycle-wide timing bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub global_deadline: Duration,
    /// Extra wait for tasks to hand back already-recorded results.
    pub grace: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            global_deadline: Duration::from_secs(5),
            grace: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FetchOrchestrator {
    config: OrchestratorConfig,
}

impl FetchOrchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Runs one fetch per admission and returns one result per admission, ordered by
    /// `(priority, source)`.
    pub async fn run(&self, admissions: Vec<Admission>) -> Vec<FetchResult> {
        let start = Instant::now();
        let deadline = start + self.config.global_deadline;
        let mut expected: Vec<(u32, String)> = Vec::with_capacity(admissions.len());
        let mut tasks = JoinSet::new();

        for Admission { entry, permit } in admissions {
            let descriptor = entry.descriptor().clone();
            let source_deadline = (start + descriptor.timeout).min(deadline);
            let budget = source_deadline.saturating_duration_since(start);
            expected.push((descriptor.priority, descriptor.name.clone()));

            let span = info_span!(
                "fetch",
                source = %descriptor.name,
                kind = %descriptor.kind,
                trial = permit.is_trial()
            );
            tasks.spawn(
                async move {
                    let started = Instant::now();
                    let outcome =
                        match timeout_at(source_deadline, entry.adapter().fetch(budget)).await {
                            Ok(outcome) => outcome,
                            Err(_) => Err(FetchError::timeout(format!(
                                "no response within {}ms",
                                budget.as_millis()
                            ))),
                        };

                    permit.record(outcome.is_ok());
                    match &outcome {
                        Ok(record) => debug!(fields = record.metrics.len(), "fetch succeeded"),
                        Err(error) => warn!(code = error.code(), %error, "fetch failed"),
                    }

                    FetchResult {
                        source: descriptor.name,
                        priority: descriptor.priority,
                        elapsed: started.elapsed(),
                        outcome,
                    }
                }
                .instrument(span),
            );
        }

        let hard_stop = deadline + self.config.grace;
        let mut results = Vec::with_capacity(expected.len());
        let mut drained = false;
        loop {
            match timeout_at(hard_stop, tasks.join_next()).await {
                Ok(Some(Ok(result))) => results.push(result),
                Ok(Some(Err(error))) => {
                    warn!(%error, "fetch task did not complete");
                }
                Ok(None) => {
                    drained = true;
                    break;
                }
                Err(_) => {
                    warn!(
                        outstanding = tasks.len(),
                        "global deadline passed; abandoning outstanding fetches"
                    );
                    break;
                }
            }
        }
        // Aborted tasks drop their permits, which records the failure.
        tasks.abort_all();

        let reported: BTreeSet<&str> = results.iter().map(|r| r.source.as_str()).collect();
        let mut missing = Vec::new();
        for (priority, name) in &expected {
            if reported.contains(name.as_str()) {
                continue;
            }
            let error = if drained {
                FetchError::transport("fetch task failed before reporting")
            } else {
                FetchError::timeout("abandoned at cycle deadline")
            };
            missing.push(FetchResult {
                source: name.clone(),
                priority: *priority,
                elapsed: start.elapsed(),
                outcome: Err(error),
            });
        }
        results.extend(missing);

        results.sort_by(|left, right| {
            (left.priority, &left.source).cmp(&(right.priority, &right.source))
        });
        results
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::backoff::Backoff;
    use crate::circuit_breaker::CircuitBreakerConfig;
    use crate::data_source::{FetchErrorKind, FetchFuture, IntermediateRecord, SourceAdapter};
    use crate::registry::{SourceDescriptor, SourceEntry, SourceRegistry};
    use crate::{MarketMetric, MetricKey, MetricSet, ProviderKind, UtcDateTime};

    struct Scripted {
        name: &'static str,
        delay: Duration,
        price: Option<f64>,
        started: AtomicUsize,
    }

    impl SourceAdapter for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        fn kind(&self) -> ProviderKind {
            ProviderKind::Generic
        }

        fn fetch(&self, _timeout: Duration) -> FetchFuture<'_> {
            self.started.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                tokio::time::sleep(self.delay).await;
                let price = self
                    .price
                    .ok_or_else(|| FetchError::transport("connection reset"))?;
                let mut metrics = MetricSet::new();
                metrics
                    .insert(MetricKey::Market(MarketMetric::Price), price)
                    .map_err(|error| FetchError::parse(error.to_string()))?;
                Ok::<_, FetchError>(IntermediateRecord::new(self.name, UtcDateTime::now(), metrics))
            })
        }
    }

    fn registry(sources: Vec<(&'static str, u32, Duration, Duration, Option<f64>)>) -> SourceRegistry {
        let entries = sources
            .into_iter()
            .map(|(name, priority, timeout, delay, price)| {
                SourceEntry::new(
                    SourceDescriptor {
                        name: name.to_owned(),
                        kind: ProviderKind::Generic,
                        endpoint: format!("https://{name}.test"),
                        priority,
                        timeout,
                        retry_budget: 3,
                        requests_per_minute: None,
                    },
                    Arc::new(Scripted {
                        name,
                        delay,
                        price,
                        started: AtomicUsize::new(0),
                    }),
                    CircuitBreakerConfig {
                        failure_threshold: 3,
                        cooldown: Backoff::default(),
                        max_backoff_steps: 3,
                    },
                    20,
                )
            })
            .collect();
        SourceRegistry::new(entries)
    }

    #[tokio::test(start_paused = true)]
    async fn slow_sources_time_out_without_delaying_the_cycle() {
        let registry = registry(vec![
            ("fast", 2, Duration::from_secs(3), Duration::from_millis(100), Some(2500.0)),
            ("slow", 1, Duration::from_secs(3), Duration::from_secs(30), Some(2600.0)),
            ("broken", 3, Duration::from_secs(3), Duration::ZERO, None),
        ]);
        let orchestrator = FetchOrchestrator::default();

        let started = Instant::now();
        let results = orchestrator.run(registry.admit_at(started).admitted).await;

        assert!(started.elapsed() <= Duration::from_secs(3) + Duration::from_millis(10));
        let summary: Vec<(&str, Option<FetchErrorKind>)> = results
            .iter()
            .map(|result| (result.source.as_str(), result.error_kind()))
            .collect();
        assert_eq!(
            summary,
            [
                ("slow", Some(FetchErrorKind::Timeout)),
                ("fast", None),
                ("broken", Some(FetchErrorKind::Transport)),
            ]
        );

        for name in ["slow", "broken"] {
            let breaker = registry.get(name).expect("registered").breaker();
            assert_eq!(breaker.consecutive_failures(), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn global_deadline_caps_generous_source_timeouts() {
        let registry = registry(vec![(
            "sluggish",
            1,
            Duration::from_secs(60),
            Duration::from_secs(45),
            Some(90.0),
        )]);
        let orchestrator = FetchOrchestrator::new(OrchestratorConfig {
            global_deadline: Duration::from_secs(5),
            grace: Duration::from_millis(250),
        });

        let started = Instant::now();
        let results = orchestrator.run(registry.admit_at(started).admitted).await;

        assert!(started.elapsed() <= Duration::from_secs(5) + Duration::from_millis(250));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].error_kind(), Some(FetchErrorKind::Timeout));
    }
}
