//! Operator-facing view of breaker, reliability, and cache state.

use std::collections::BTreeMap;

use serde::Serialize;
use tokio::time::Instant;

use crate::cache::{RefreshOutcome, SnapshotCache};
use crate::circuit_breaker::CircuitState;
use crate::registry::SourceRegistry;
use crate::{FetchErrorKind, ProviderKind, UtcDateTime};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineHealth {
    pub sources: Vec<SourceHealth>,
    pub cache: CacheHealth,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceHealth {
    pub name: String,
    pub kind: ProviderKind,
    pub priority: u32,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub reopen_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<UtcDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition: Option<UtcDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_remaining_ms: Option<u64>,
    pub window_attempts: usize,
    /// Success share over the rolling window; absent before the first attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_rate: Option<f64>,
    pub error_counts: BTreeMap<FetchErrorKind, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheHealth {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_refresh_at: Option<UtcDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_refresh: Option<RefreshOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_age_ms: Option<u64>,
    /// Zero once the entry has expired.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_ms: Option<u64>,
    pub refreshing: bool,
}

impl EngineHealth {
    pub(crate) fn collect(registry: &SourceRegistry, cache: &SnapshotCache, now: Instant) -> Self {
        let sources = registry
            .entries()
            .iter()
            .map(|entry| {
                let descriptor = entry.descriptor();
                let status = entry.breaker().status_at(now);
                let window = entry.window();
                SourceHealth {
                    name: descriptor.name.clone(),
                    kind: descriptor.kind,
                    priority: descriptor.priority,
                    state: status.state,
                    consecutive_failures: status.consecutive_failures,
                    reopen_count: status.reopen_count,
                    last_failure: status.last_failure,
                    last_transition: status.last_transition,
                    cooldown_remaining_ms: status.cooldown_remaining.map(millis),
                    window_attempts: window.attempts(),
                    success_rate: window.success_rate(),
                    error_counts: window.error_counts(),
                }
            })
            .collect();

        let last = cache.last_refresh();
        let entry = cache.entry();
        Self {
            sources,
            cache: CacheHealth {
                last_refresh_at: last.map(|record| record.at),
                last_refresh: last.map(|record| record.outcome),
                entry_age_ms: entry
                    .as_ref()
                    .map(|entry| millis(now.saturating_duration_since(entry.cached_at))),
                expires_in_ms: entry
                    .as_ref()
                    .map(|entry| millis(entry.expires_at.saturating_duration_since(now))),
                refreshing: cache.is_refreshing(),
            },
        }
    }

    pub fn open_circuits(&self) -> usize {
        self.sources
            .iter()
            .filter(|source| source.state != CircuitState::Closed)
            .count()
    }
}

fn millis(duration: std::time::Duration) -> u64 {
    duration.as_millis().min(u128::from(u64::MAX)) as u64
}
