//! The snapshot document served to consumers.
//!
//! ```json
//! {
//!   "dataSource": ["b", "a"],
//!   "liveDataEnabled": true,
//!   "data": {
//!     "marketOverview": { "currentPrice": 2600.0, "generationMix": { "wind": 400.0 } },
//!     "regionalData": { "NSW1": { "price": 91.2 } },
//!     "dataQuality": { "sourcesUsed": 2, "reliabilityScore": 44, "successRate": 67, ... }
//!   },
//!   "timestamp": "2024-05-10T09:00:00Z"
//! }
//! ```
//!
//! Fields no source reported are omitted, never zero-filled. Live and simulated snapshots are
//! assembled by the same code from [`FusedMetrics`], so the schema cannot drift between them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::fusion::FusedMetrics;
use crate::registry::SkipReason;
use crate::{FuelType, MarketMetric, MetricKey, RegionMetric, UtcDateTime};

/// Source label carried by every synthetic snapshot and field.
pub const SIMULATED_DATA_SOURCE: &str = "Simulated Data";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FusedSnapshot {
    pub data_source: Vec<String>,
    pub live_data_enabled: bool,
    pub data: SnapshotData,
    pub timestamp: UtcDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotData {
    pub market_overview: MarketOverview,
    pub regional_data: BTreeMap<String, RegionSnapshot>,
    pub data_quality: DataQuality,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketOverview {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_demand: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_generation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renewable_share: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traded_volume: Option<f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub generation_mix: BTreeMap<FuelType, f64>,
}

impl MarketOverview {
    pub fn get(&self, metric: MarketMetric) -> Option<f64> {
        match metric {
            MarketMetric::Price => self.current_price,
            MarketMetric::Demand => self.total_demand,
            MarketMetric::Generation => self.total_generation,
            MarketMetric::RenewableShare => self.renewable_share,
            MarketMetric::Frequency => self.frequency,
            MarketMetric::TradedVolume => self.traded_volume,
        }
    }

    fn slot(&mut self, metric: MarketMetric) -> &mut Option<f64> {
        match metric {
            MarketMetric::Price => &mut self.current_price,
            MarketMetric::Demand => &mut self.total_demand,
            MarketMetric::Generation => &mut self.total_generation,
            MarketMetric::RenewableShare => &mut self.renewable_share,
            MarketMetric::Frequency => &mut self.frequency,
            MarketMetric::TradedVolume => &mut self.traded_volume,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub demand: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_interchange: Option<f64>,
}

impl RegionSnapshot {
    fn slot(&mut self, metric: RegionMetric) -> &mut Option<f64> {
        match metric {
            RegionMetric::Price => &mut self.price,
            RegionMetric::Demand => &mut self.demand,
            RegionMetric::Generation => &mut self.generation,
            RegionMetric::NetInterchange => &mut self.net_interchange,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataQuality {
    pub sources_used: usize,
    pub reliability_score: u8,
    pub success_rate: u8,
    pub sources_configured: usize,
    pub sources_attempted: usize,
    pub recent_failure_rate: f64,
    /// Field path to the source that supplied it and every source that reported it.
    pub provenance: BTreeMap<String, FieldProvenance>,
    pub sources: Vec<SourceContribution>,
    pub skipped: BTreeMap<String, SkipReason>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldProvenance {
    pub selected: String,
    pub contributors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceContribution {
    pub name: String,
    pub priority: u32,
    pub fetched_at: UtcDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_at: Option<UtcDateTime>,
    pub parse_confidence: f64,
    pub fetch_ms: u64,
}

impl FusedSnapshot {
    /// Lays fused values out as a snapshot document. `dataSource` and provenance come from
    /// `fused`; the caller supplies the scores.
    pub fn from_fused(
        fused: &FusedMetrics,
        live_data_enabled: bool,
        mut data_quality: DataQuality,
        timestamp: UtcDateTime,
    ) -> Self {
        let mut market_overview = MarketOverview::default();
        let mut regional_data: BTreeMap<String, RegionSnapshot> = BTreeMap::new();

        for (key, fused_value) in &fused.values {
            match key {
                MetricKey::Market(metric) => {
                    *market_overview.slot(*metric) = Some(fused_value.value);
                }
                MetricKey::Generation(fuel) => {
                    market_overview
                        .generation_mix
                        .insert(*fuel, fused_value.value);
                }
                MetricKey::Region(region, metric) => {
                    *regional_data
                        .entry(region.as_str().to_owned())
                        .or_default()
                        .slot(*metric) = Some(fused_value.value);
                }
            }

            data_quality.provenance.insert(
                key.path(),
                FieldProvenance {
                    selected: fused_value.selected.clone(),
                    contributors: fused_value.contributors.clone(),
                },
            );
        }

        Self {
            data_source: fused.sources(),
            live_data_enabled,
            data: SnapshotData {
                market_overview,
                regional_data,
                data_quality,
            },
            timestamp,
        }
    }

    pub fn is_simulated(&self) -> bool {
        !self.live_data_enabled
    }

    pub fn market(&self, metric: MarketMetric) -> Option<f64> {
        self.data.market_overview.get(metric)
    }
}
