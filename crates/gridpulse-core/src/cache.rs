//! Single-entry snapshot cache with stale-while-revalidate refresh.
//!
//! At most one refresh runs at a time. A caller that finds a fresh entry gets it; one that
//! finds an expired entry gets it immediately while a background refresh replaces it; only a
//! cold cache makes callers wait, and they all wait on the same refresh. Entries are
//! replaced whole under the lock, so readers never see a partial entry.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::snapshot::FusedSnapshot;
use crate::UtcDateTime;

/// Expiry horizon used when a configured TTL does not fit the clock.
const MAX_ENTRY_LIFETIME: Duration = Duration::from_secs(365 * 24 * 60 * 60);

type RefreshReceiver = watch::Receiver<Option<Arc<FusedSnapshot>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Lifetime of a live snapshot.
    pub ttl: Duration,
    /// Lifetime of a simulated snapshot.
    pub fallback_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            fallback_ttl: Duration::from_secs(60),
        }
    }
}

/// The current snapshot and its validity window.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub snapshot: Arc<FusedSnapshot>,
    pub cached_at: Instant,
    pub expires_at: Instant,
    pub cached_at_wall: UtcDateTime,
}

impl CacheEntry {
    pub fn is_fresh_at(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// How a lookup was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    Fresh,
    /// Expired entry served while a refresh runs.
    Stale,
    /// Produced by a refresh this caller waited for.
    Refreshed,
}

#[derive(Debug, Clone)]
pub struct CacheLookup {
    pub snapshot: Arc<FusedSnapshot>,
    pub status: CacheStatus,
}

/// Result of the most recent completed refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RefreshOutcome {
    Live {
        #[serde(rename = "sourcesUsed")]
        sources_used: usize,
    },
    Fallback,
}

impl RefreshOutcome {
    fn of(snapshot: &FusedSnapshot) -> Self {
        if snapshot.live_data_enabled {
            Self::Live {
                sources_used: snapshot.data.data_quality.sources_used,
            }
        } else {
            Self::Fallback
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshRecord {
    pub at: UtcDateTime,
    pub outcome: RefreshOutcome,
}

#[derive(Debug, Default)]
struct CacheState {
    current: Option<CacheEntry>,
    in_flight: Option<RefreshReceiver>,
    last_refresh: Option<RefreshRecord>,
}

#[derive(Debug, Default)]
pub struct SnapshotCache {
    config: CacheConfig,
    state: Mutex<CacheState>,
}

impl SnapshotCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Serves the current entry, refreshing through `refresh` when it is missing or expired.
    ///
    /// Returns `None` only when the cache was cold and the refresh ended without a snapshot.
    pub async fn get_or_refresh<F, Fut>(self: &Arc<Self>, refresh: F) -> Option<CacheLookup>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Arc<FusedSnapshot>> + Send + 'static,
    {
        let receiver = {
            let mut state = self.lock();
            let now = Instant::now();

            if let Some(entry) = &state.current {
                if entry.is_fresh_at(now) {
                    return Some(CacheLookup {
                        snapshot: Arc::clone(&entry.snapshot),
                        status: CacheStatus::Fresh,
                    });
                }

                let snapshot = Arc::clone(&entry.snapshot);
                if state.in_flight.is_none() {
                    debug!("cache entry expired; refreshing in background");
                    self.start_refresh(&mut state, refresh());
                }
                return Some(CacheLookup {
                    snapshot,
                    status: CacheStatus::Stale,
                });
            }

            match state.in_flight.clone() {
                Some(receiver) => receiver,
                None => self.start_refresh(&mut state, refresh()),
            }
        };

        wait(receiver).await.map(|snapshot| CacheLookup {
            snapshot,
            status: CacheStatus::Refreshed,
        })
    }

    /// Runs a refresh now (or joins the one in flight) and waits for its snapshot.
    pub async fn refresh_with<F, Fut>(self: &Arc<Self>, refresh: F) -> Option<Arc<FusedSnapshot>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Arc<FusedSnapshot>> + Send + 'static,
    {
        let receiver = {
            let mut state = self.lock();
            match state.in_flight.clone() {
                Some(receiver) => receiver,
                None => self.start_refresh(&mut state, refresh()),
            }
        };
        wait(receiver).await
    }

    /// Starts a background refresh unless one is already running. Must be called from
    /// within a tokio runtime.
    pub fn trigger_refresh<F, Fut>(self: &Arc<Self>, refresh: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Arc<FusedSnapshot>> + Send + 'static,
    {
        let mut state = self.lock();
        if state.in_flight.is_some() {
            return false;
        }
        self.start_refresh(&mut state, refresh());
        true
    }

    pub fn entry(&self) -> Option<CacheEntry> {
        self.lock().current.clone()
    }

    pub fn last_refresh(&self) -> Option<RefreshRecord> {
        self.lock().last_refresh
    }

    pub fn is_refreshing(&self) -> bool {
        self.lock().in_flight.is_some()
    }

    /// Replaces the current entry. The TTL depends on whether the snapshot is live.
    pub fn store(&self, snapshot: Arc<FusedSnapshot>) {
        let now = Instant::now();
        let ttl = if snapshot.live_data_enabled {
            self.config.ttl
        } else {
            self.config.fallback_ttl
        };
        let wall = UtcDateTime::now();

        let mut state = self.lock();
        state.last_refresh = Some(RefreshRecord {
            at: wall,
            outcome: RefreshOutcome::of(&snapshot),
        });
        state.current = Some(CacheEntry {
            snapshot,
            cached_at: now,
            expires_at: now.checked_add(ttl).unwrap_or(now + MAX_ENTRY_LIFETIME),
            cached_at_wall: wall,
        });
    }

    fn start_refresh<Fut>(self: &Arc<Self>, state: &mut CacheState, refresh: Fut) -> RefreshReceiver
    where
        Fut: Future<Output = Arc<FusedSnapshot>> + Send + 'static,
    {
        let (sender, receiver) = watch::channel(None);
        state.in_flight = Some(receiver.clone());

        let mut guard = InFlightGuard {
            cache: Arc::clone(self),
            completed: false,
        };
        tokio::spawn(async move {
            let snapshot = refresh.await;
            guard.cache.store(Arc::clone(&snapshot));
            guard.cache.lock().in_flight = None;
            guard.completed = true;
            sender.send_replace(Some(snapshot));
        });

        receiver
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases the in-flight slot if a refresh task dies before completing.
struct InFlightGuard {
    cache: Arc<SnapshotCache>,
    completed: bool,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if !self.completed {
            warn!("snapshot refresh ended without a result");
            self.cache.lock().in_flight = None;
        }
    }
}

async fn wait(mut receiver: RefreshReceiver) -> Option<Arc<FusedSnapshot>> {
    match receiver.wait_for(Option::is_some).await {
        Ok(value) => value.clone(),
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::fusion::{FusedMetrics, RankedRecord};
    use crate::snapshot::DataQuality;
    use crate::{IntermediateRecord, MetricSet};

    fn snapshot(live: bool, label: &str) -> Arc<FusedSnapshot> {
        let record = IntermediateRecord::new(label, UtcDateTime::now(), MetricSet::new());
        let fused = FusedMetrics::single(RankedRecord::new(1, record));
        Arc::new(FusedSnapshot::from_fused(
            &fused,
            live,
            DataQuality::default(),
            UtcDateTime::now(),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn cold_cache_runs_one_refresh_for_concurrent_callers() {
        let cache = Arc::new(SnapshotCache::new(CacheConfig::default()));
        let runs = Arc::new(AtomicUsize::new(0));

        let refresh = |runs: Arc<AtomicUsize>| {
            move || async move {
                runs.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(200)).await;
                snapshot(true, "a")
            }
        };

        let (first, second) = tokio::join!(
            cache.get_or_refresh(refresh(Arc::clone(&runs))),
            cache.get_or_refresh(refresh(Arc::clone(&runs))),
        );

        let first = first.expect("refresh produced a snapshot");
        let second = second.expect("refresh produced a snapshot");
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first.snapshot, &second.snapshot));
        assert_eq!(first.status, CacheStatus::Refreshed);
        assert!(!cache.is_refreshing());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_served_while_refreshing() {
        let cache = Arc::new(SnapshotCache::new(CacheConfig::default()));
        cache.store(snapshot(true, "old"));

        tokio::time::advance(Duration::from_secs(301)).await;
        let lookup = cache
            .get_or_refresh(|| async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                snapshot(true, "new")
            })
            .await
            .expect("stale entry served");
        assert_eq!(lookup.status, CacheStatus::Stale);
        assert_eq!(lookup.snapshot.data_source, ["old"]);
        assert!(cache.is_refreshing());
        assert!(!cache.trigger_refresh(|| async { snapshot(true, "dup") }));

        tokio::time::sleep(Duration::from_secs(2)).await;
        let entry = cache.entry().expect("refreshed");
        assert_eq!(entry.snapshot.data_source, ["new"]);
        assert!(!cache.is_refreshing());
    }

    #[tokio::test(start_paused = true)]
    async fn simulated_snapshots_use_the_short_ttl() {
        let cache = SnapshotCache::new(CacheConfig::default());
        cache.store(snapshot(false, "Simulated Data"));

        let entry = cache.entry().expect("stored");
        assert_eq!(entry.expires_at - entry.cached_at, Duration::from_secs(60));
        assert_eq!(
            cache.last_refresh().map(|record| record.outcome),
            Some(RefreshOutcome::Fallback)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_ttl_saturates_instead_of_overflowing() {
        let cache = SnapshotCache::new(CacheConfig {
            ttl: Duration::MAX,
            fallback_ttl: Duration::from_secs(60),
        });
        cache.store(snapshot(true, "live"));

        let entry = cache.entry().expect("stored");
        assert!(entry.is_fresh_at(Instant::now() + Duration::from_secs(86_400)));
    }

    async fn exploding_refresh() -> Arc<FusedSnapshot> {
        panic!("refresh blew up")
    }

    #[tokio::test]
    async fn failed_refresh_frees_the_slot() {
        let cache = Arc::new(SnapshotCache::new(CacheConfig::default()));
        let lookup = cache.get_or_refresh(exploding_refresh).await;

        assert!(lookup.is_none());
        assert!(!cache.is_refreshing());
    }
}
