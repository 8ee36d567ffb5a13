//! # Domain Models
//!
//! Canonical metric vocabulary shared by adapters, fusion, and the snapshot document.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`MetricKey`] | One logical snapshot field (market, generation mix, or regional) |
//! | [`MetricSet`] | Validated, canonically ordered metric values from one provider |
//! | [`MarketMetric`] | System-wide metrics (price, demand, generation, ...) |
//! | [`RegionMetric`] | Per-region metrics |
//! | [`FuelType`] | Generation mix families |
//! | [`RegionCode`] | Validated region identifier |
//! | [`UtcDateTime`] | UTC timestamp |
//!
//! Ordering of [`MetricKey`] is total and derived, so every map keyed by it iterates in
//! the same order on every run.

mod metrics;
mod timestamp;

pub use metrics::{FuelType, MarketMetric, MetricKey, MetricSet, RegionCode, RegionMetric};
pub use timestamp::UtcDateTime;
