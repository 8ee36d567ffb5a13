//! Aggregation engine facade.
//!
//! One cycle admits sources through their breakers and quotas, fans out fetches, records
//! outcomes, fuses the successful records, and scores the result. When nothing usable comes
//! back the cycle produces a simulated snapshot instead, so [`AggregationEngine::get_snapshot`]
//! always returns a valid document.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::adapters::build_adapter;
use crate::cache::{CacheConfig, CacheLookup, CacheStatus, SnapshotCache};
use crate::config::EngineConfig;
use crate::data_source::FetchResult;
use crate::fallback::{FallbackConfig, FallbackGenerator};
use crate::fusion::{fuse, FusedMetrics, RankedRecord};
use crate::health::EngineHealth;
use crate::http_client::HttpClient;
use crate::orchestrator::{FetchOrchestrator, OrchestratorConfig};
use crate::registry::{SkipReason, SourceEntry, SourceRegistry};
use crate::reliability;
use crate::snapshot::{DataQuality, FusedSnapshot, SourceContribution};
use crate::{ConfigError, CycleError, UtcDateTime};

/// Cheap to clone; clones share sources, breakers, and cache.
#[derive(Clone)]
pub struct AggregationEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    registry: SourceRegistry,
    orchestrator: FetchOrchestrator,
    fallback: FallbackGenerator,
    cache: Arc<SnapshotCache>,
}

/// What a cycle knew about its sources before fusion.
struct CycleContext {
    attempted: usize,
    skipped: std::collections::BTreeMap<String, SkipReason>,
    failure_rate: f64,
}

impl AggregationEngine {
    /// Builds adapters for every configured source. API keys are read from the
    /// environment here, once.
    pub fn from_config(
        config: &EngineConfig,
        http_client: Arc<dyn HttpClient>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let breaker = config.breaker_config();

        let entries = config
            .sources
            .iter()
            .map(|source| {
                let descriptor = source.descriptor()?;
                let auth = descriptor.kind.auth_for_key(source.api_key());
                let adapter = build_adapter(
                    descriptor.kind,
                    descriptor.name.clone(),
                    descriptor.endpoint.clone(),
                    Arc::clone(&http_client),
                    auth,
                );
                Ok(SourceEntry::new(
                    descriptor,
                    adapter,
                    breaker,
                    config.engine.failure_window,
                ))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self::new(
            SourceRegistry::new(entries),
            config.orchestrator_config(),
            config.cache_config(),
            config.fallback_config()?,
        ))
    }

    pub fn new(
        registry: SourceRegistry,
        orchestrator: OrchestratorConfig,
        cache: CacheConfig,
        fallback: FallbackConfig,
    ) -> Self {
        info!(sources = registry.len(), "aggregation engine ready");
        Self {
            inner: Arc::new(EngineInner {
                registry,
                orchestrator: FetchOrchestrator::new(orchestrator),
                fallback: FallbackGenerator::new(fallback),
                cache: Arc::new(SnapshotCache::new(cache)),
            }),
        }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.inner.registry
    }

    /// Current snapshot. Never fails: a cold cache that cannot be filled in time yields a
    /// simulated snapshot.
    pub async fn get_snapshot(&self) -> Arc<FusedSnapshot> {
        self.lookup().await.snapshot
    }

    /// Like [`get_snapshot`](Self::get_snapshot), also reporting how the cache served it.
    pub async fn lookup(&self) -> CacheLookup {
        let config = self.inner.orchestrator.config();
        let budget = config.global_deadline + config.grace * 2;
        let inner = Arc::clone(&self.inner);

        let lookup = tokio::time::timeout(
            budget,
            self.inner
                .cache
                .get_or_refresh(move || EngineInner::run_cycle(inner)),
        )
        .await;

        match lookup {
            Ok(Some(lookup)) => lookup,
            Ok(None) => {
                warn!("refresh ended without a snapshot; serving simulated data");
                self.uncached_fallback()
            }
            Err(_) => {
                warn!(
                    budget_ms = budget.as_millis() as u64,
                    "snapshot not ready in time; serving simulated data"
                );
                self.uncached_fallback()
            }
        }
    }

    /// Runs a cycle now (or joins the one in flight) and returns its snapshot.
    pub async fn refresh(&self) -> Arc<FusedSnapshot> {
        let inner = Arc::clone(&self.inner);
        match self
            .inner
            .cache
            .refresh_with(move || EngineInner::run_cycle(inner))
            .await
        {
            Some(snapshot) => snapshot,
            None => self.uncached_fallback().snapshot,
        }
    }

    /// Starts a background cycle; `false` when one is already running.
    pub fn trigger_refresh(&self) -> bool {
        let inner = Arc::clone(&self.inner);
        self.inner
            .cache
            .trigger_refresh(move || EngineInner::run_cycle(inner))
    }

    /// Triggers a refresh every `period` until the handle is aborted. Ticks that land while
    /// a cycle is still running are skipped.
    pub fn spawn_auto_refresh(&self, period: Duration) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !engine.trigger_refresh() {
                    debug!("refresh already running; skipping tick");
                }
            }
        })
    }

    pub fn health(&self) -> EngineHealth {
        EngineHealth::collect(&self.inner.registry, &self.inner.cache, Instant::now())
    }

    fn uncached_fallback(&self) -> CacheLookup {
        let context = CycleContext {
            attempted: 0,
            skipped: Default::default(),
            failure_rate: self.inner.registry.recent_failure_rate(),
        };
        CacheLookup {
            snapshot: Arc::new(self.inner.simulated(&context)),
            status: CacheStatus::Refreshed,
        }
    }
}

impl EngineInner {
    async fn run_cycle(self: Arc<Self>) -> Arc<FusedSnapshot> {
        let cycle_id = Uuid::new_v4();
        let span = info_span!("cycle", id = %cycle_id);

        async move {
            let plan = self.registry.admit_at(Instant::now());
            let attempted = plan.admitted.len();
            debug!(attempted, skipped = plan.skipped.len(), "sources admitted");

            let results = self.orchestrator.run(plan.admitted).await;
            self.registry.record_results(&results);

            let context = CycleContext {
                attempted,
                skipped: plan.skipped,
                failure_rate: self.registry.recent_failure_rate(),
            };

            let snapshot = match self.live(results, &context) {
                Ok(snapshot) => {
                    info!(
                        sources_used = snapshot.data.data_quality.sources_used,
                        reliability = snapshot.data.data_quality.reliability_score,
                        "cycle produced live snapshot"
                    );
                    snapshot
                }
                Err(error) => {
                    warn!(%error, "serving simulated data");
                    self.simulated(&context)
                }
            };
            Arc::new(snapshot)
        }
        .instrument(span)
        .await
    }

    fn live(
        &self,
        results: Vec<FetchResult>,
        context: &CycleContext,
    ) -> Result<FusedSnapshot, CycleError> {
        let mut contributions = Vec::new();
        let mut ranked = Vec::new();
        for result in results {
            let fetch_ms = result.elapsed_ms();
            if let Ok(record) = result.outcome {
                contributions.push(SourceContribution {
                    name: record.source.clone(),
                    priority: result.priority,
                    fetched_at: record.fetched_at,
                    observed_at: record.observed_at,
                    parse_confidence: record.parse_confidence,
                    fetch_ms,
                });
                ranked.push(RankedRecord::new(result.priority, record));
            }
        }

        let fused = fuse(ranked).ok_or(CycleError::AllSourcesExhausted {
            attempted: context.attempted,
            skipped: context.skipped.len(),
        })?;
        let now = UtcDateTime::now();
        self.fallback.remember(&fused, now);

        let used = fused.records.len();
        let configured = self.registry.len();
        let quality = DataQuality {
            sources_used: used,
            reliability_score: reliability::reliability_score(
                used,
                configured,
                context.failure_rate,
            ),
            success_rate: reliability::success_rate(used, context.attempted),
            sources_configured: configured,
            sources_attempted: context.attempted,
            recent_failure_rate: round4(context.failure_rate),
            provenance: Default::default(),
            sources: contributions,
            skipped: context.skipped.clone(),
        };
        Ok(FusedSnapshot::from_fused(&fused, true, quality, now))
    }

    fn simulated(&self, context: &CycleContext) -> FusedSnapshot {
        let now = UtcDateTime::now();
        let fused: FusedMetrics = self.fallback.generate_at(now);
        let quality = DataQuality {
            sources_used: 0,
            reliability_score: 0,
            success_rate: reliability::success_rate(0, context.attempted),
            sources_configured: self.registry.len(),
            sources_attempted: context.attempted,
            recent_failure_rate: round4(context.failure_rate),
            provenance: Default::default(),
            sources: Vec::new(),
            skipped: context.skipped.clone(),
        };
        FusedSnapshot::from_fused(&fused, false, quality, now)
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
