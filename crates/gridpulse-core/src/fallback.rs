//! Synthetic snapshot values for cycles where no source delivered.
//!
//! Values are a pure function of `(seed, time bucket, last-known-good)`: every call inside the
//! same bucket yields the same numbers. Without a last-known-good snapshot each market
//! metric walks from its baseline; with one, it walks from the remembered value decayed
//! toward the baseline by `0.5^(age / half_life)`. Everything is clamped to [`FallbackBounds`]
//! and rounded to two decimals, and every field is attributed to
//! [`SIMULATED_DATA_SOURCE`](crate::SIMULATED_DATA_SOURCE).

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data_source::IntermediateRecord;
use crate::fusion::{FusedMetrics, RankedRecord};
use crate::snapshot::SIMULATED_DATA_SOURCE;
use crate::{
    FuelType, MarketMetric, MetricKey, MetricSet, RegionCode, RegionMetric, UtcDateTime,
};

const WALK_STEPS: usize = 12;
/// Largest single walk step as a share of the bound's span.
const WALK_STEP_SHARE: f64 = 0.02;
const SEED_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// Renewable generation split (shares of the renewable portion).
const RENEWABLE_SPLIT: [(FuelType, f64); 4] = [
    (FuelType::Wind, 0.42),
    (FuelType::Solar, 0.36),
    (FuelType::Hydro, 0.18),
    (FuelType::Biomass, 0.04),
];

/// Non-renewable generation split (shares of the remainder).
const FIRM_SPLIT: [(FuelType, f64); 4] = [
    (FuelType::Coal, 0.74),
    (FuelType::Gas, 0.18),
    (FuelType::Battery, 0.03),
    (FuelType::Other, 0.05),
];

/// Plausible range and resting value of one metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricBounds {
    pub min: f64,
    pub max: f64,
    pub baseline: f64,
}

impl MetricBounds {
    pub const fn new(min: f64, max: f64, baseline: f64) -> Self {
        Self { min, max, baseline }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn is_valid(&self) -> bool {
        self.min.is_finite()
            && self.max.is_finite()
            && self.min < self.max
            && self.contains(self.baseline)
    }

    fn clamp(&self, value: f64) -> f64 {
        if value.is_finite() {
            value.clamp(self.min, self.max)
        } else {
            self.baseline
        }
    }

    fn span(&self) -> f64 {
        self.max - self.min
    }
}

/// Bounds for every synthetic market metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackBounds {
    pub price: MetricBounds,
    pub demand: MetricBounds,
    pub generation: MetricBounds,
    pub renewable_share: MetricBounds,
    pub frequency: MetricBounds,
    pub traded_volume: MetricBounds,
}

impl Default for FallbackBounds {
    fn default() -> Self {
        Self {
            price: MetricBounds::new(20.0, 300.0, 85.0),
            demand: MetricBounds::new(15_000.0, 35_000.0, 24_000.0),
            generation: MetricBounds::new(15_000.0, 36_000.0, 24_500.0),
            renewable_share: MetricBounds::new(5.0, 80.0, 35.0),
            frequency: MetricBounds::new(49.85, 50.15, 50.0),
            traded_volume: MetricBounds::new(1_000.0, 20_000.0, 6_000.0),
        }
    }
}

impl FallbackBounds {
    pub fn for_metric(&self, metric: MarketMetric) -> MetricBounds {
        match metric {
            MarketMetric::Price => self.price,
            MarketMetric::Demand => self.demand,
            MarketMetric::Generation => self.generation,
            MarketMetric::RenewableShare => self.renewable_share,
            MarketMetric::Frequency => self.frequency,
            MarketMetric::TradedVolume => self.traded_volume,
        }
    }

    /// First metric whose bounds are unusable.
    pub fn first_invalid(&self) -> Option<MarketMetric> {
        MarketMetric::ALL
            .into_iter()
            .find(|metric| !self.for_metric(*metric).is_valid())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FallbackConfig {
    pub seed: u64,
    pub bucket: Duration,
    pub half_life: Duration,
    pub regions: Vec<RegionCode>,
    pub bounds: FallbackBounds,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            seed: 0x6772_6964,
            bucket: Duration::from_secs(300),
            half_life: Duration::from_secs(1800),
            regions: ["NSW1", "QLD1", "VIC1", "SA1", "TAS1"]
                .into_iter()
                .filter_map(|code| RegionCode::parse(code).ok())
                .collect(),
            bounds: FallbackBounds::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct LastKnownGood {
    market: BTreeMap<MarketMetric, f64>,
    at: UtcDateTime,
}

/// Produces deterministic, clearly labeled synthetic values.
#[derive(Debug)]
pub struct FallbackGenerator {
    config: FallbackConfig,
    last_known_good: Mutex<Option<LastKnownGood>>,
}

impl FallbackGenerator {
    pub fn new(config: FallbackConfig) -> Self {
        Self {
            config,
            last_known_good: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &FallbackConfig {
        &self.config
    }

    /// Remembers the market values of a live cycle as the decay anchor.
    pub fn remember(&self, fused: &FusedMetrics, at: UtcDateTime) {
        let market: BTreeMap<MarketMetric, f64> = fused
            .values
            .iter()
            .filter_map(|(key, fused_value)| match key {
                MetricKey::Market(metric) => Some((*metric, fused_value.value)),
                _ => None,
            })
            .collect();
        if market.is_empty() {
            return;
        }

        *self.lock() = Some(LastKnownGood { market, at });
    }

    /// Synthetic values for the bucket containing `now`.
    pub fn generate_at(&self, now: UtcDateTime) -> FusedMetrics {
        let bucket_secs = self.config.bucket.as_secs().max(1) as i64;
        let bucket = now.unix_timestamp().div_euclid(bucket_secs);
        let bucket_start = bucket.saturating_mul(bucket_secs);
        let mut rng = fastrand::Rng::with_seed(self.config.seed ^ (bucket as u64).wrapping_mul(SEED_MIX));
        let anchor = self.lock().clone();

        let mut market = BTreeMap::new();
        for metric in MarketMetric::ALL {
            let bounds = self.config.bounds.for_metric(metric);
            let start = match &anchor {
                Some(lkg) => match lkg.market.get(&metric) {
                    Some(value) => {
                        let age = (bucket_start - lkg.at.unix_timestamp()).max(0) as f64;
                        decay_toward(bounds.baseline, *value, age, self.config.half_life)
                    }
                    None => bounds.baseline,
                },
                None => bounds.baseline,
            };
            market.insert(metric, walk(&mut rng, &bounds, start));
        }

        let mut metrics = MetricSet::new();
        for (metric, value) in &market {
            put(&mut metrics, MetricKey::Market(*metric), *value);
        }

        let generation = market[&MarketMetric::Generation];
        let renewable = generation * market[&MarketMetric::RenewableShare] / 100.0;
        for (fuel, share) in split(&mut rng, &RENEWABLE_SPLIT, renewable)
            .into_iter()
            .chain(split(&mut rng, &FIRM_SPLIT, generation - renewable))
        {
            put(&mut metrics, MetricKey::Generation(fuel), share);
        }

        self.regional(&mut rng, &market, &mut metrics);

        let record = IntermediateRecord::new(SIMULATED_DATA_SOURCE, now, metrics);
        debug!(bucket, anchored = anchor.is_some(), "generated simulated values");
        FusedMetrics::single(RankedRecord::new(u32::MAX, record))
    }

    fn regional(
        &self,
        rng: &mut fastrand::Rng,
        market: &BTreeMap<MarketMetric, f64>,
        metrics: &mut MetricSet,
    ) {
        let regions = &self.config.regions;
        if regions.is_empty() {
            return;
        }

        let demand_weights = weights(rng, regions.len());
        let generation_weights = weights(rng, regions.len());
        let price_bounds = self.config.bounds.price;

        for (index, region) in regions.iter().enumerate() {
            let demand = round2(market[&MarketMetric::Demand] * demand_weights[index]);
            let generation = round2(market[&MarketMetric::Generation] * generation_weights[index]);
            let price = round2(
                price_bounds.clamp(market[&MarketMetric::Price] * (1.0 + jitter(rng, 0.08))),
            );

            put(metrics, MetricKey::Region(region.clone(), RegionMetric::Price), price);
            put(metrics, MetricKey::Region(region.clone(), RegionMetric::Demand), demand);
            put(
                metrics,
                MetricKey::Region(region.clone(), RegionMetric::Generation),
                generation,
            );
            put(
                metrics,
                MetricKey::Region(region.clone(), RegionMetric::NetInterchange),
                round2(generation - demand),
            );
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<LastKnownGood>> {
        self.last_known_good
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn decay_toward(baseline: f64, value: f64, age_secs: f64, half_life: Duration) -> f64 {
    let half_life = half_life.as_secs_f64();
    if half_life <= 0.0 {
        return baseline;
    }
    baseline + (value - baseline) * 0.5_f64.powf(age_secs / half_life)
}

fn walk(rng: &mut fastrand::Rng, bounds: &MetricBounds, start: f64) -> f64 {
    let step = bounds.span() * WALK_STEP_SHARE;
    let mut value = bounds.clamp(start);
    for _ in 0..WALK_STEPS {
        value = bounds.clamp(value + jitter(rng, 1.0) * step);
    }
    round2(bounds.clamp(value))
}

fn split(rng: &mut fastrand::Rng, table: &[(FuelType, f64)], total: f64) -> Vec<(FuelType, f64)> {
    let jittered: Vec<(FuelType, f64)> = table
        .iter()
        .map(|(fuel, share)| (*fuel, share * (1.0 + jitter(rng, 0.1))))
        .collect();
    let sum: f64 = jittered.iter().map(|(_, share)| share).sum();

    jittered
        .into_iter()
        .map(|(fuel, share)| (fuel, round2((total * share / sum).max(0.0))))
        .collect()
}

fn weights(rng: &mut fastrand::Rng, count: usize) -> Vec<f64> {
    let raw: Vec<f64> = (0..count).map(|_| 1.0 + jitter(rng, 0.15)).collect();
    let sum: f64 = raw.iter().sum();
    raw.into_iter().map(|weight| weight / sum).collect()
}

/// Uniform value in `[-amplitude, amplitude)`.
fn jitter(rng: &mut fastrand::Rng, amplitude: f64) -> f64 {
    (rng.f64() * 2.0 - 1.0) * amplitude
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn put(metrics: &mut MetricSet, key: MetricKey, value: f64) {
    if let Err(error) = metrics.insert(key, value) {
        debug!(%error, "discarding simulated value");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::fuse;

    fn at(raw: &str) -> UtcDateTime {
        UtcDateTime::parse(raw).expect("valid timestamp")
    }

    #[test]
    fn values_stay_within_bounds_and_are_never_zero() {
        let generator = FallbackGenerator::new(FallbackConfig::default());
        let bounds = FallbackBounds::default();

        for minute in 0..120 {
            let now = at("2024-05-10T00:00:00Z");
            let now = UtcDateTime::from_offset_datetime(
                now.into_inner() + time::Duration::minutes(minute),
            )
            .expect("utc");
            let fused = generator.generate_at(now);

            for metric in MarketMetric::ALL {
                let value = fused
                    .get(&MetricKey::Market(metric))
                    .expect("every market metric is generated");
                assert!(bounds.for_metric(metric).contains(value), "{metric:?}={value}");
                assert_ne!(value, 0.0);
            }
            assert!(fused
                .values
                .values()
                .all(|value| value.selected == SIMULATED_DATA_SOURCE));
        }
    }

    #[test]
    fn same_bucket_same_values() {
        let generator = FallbackGenerator::new(FallbackConfig::default());
        let first = generator.generate_at(at("2024-05-10T09:00:10Z"));
        let second = generator.generate_at(at("2024-05-10T09:04:50Z"));
        let next_bucket = generator.generate_at(at("2024-05-10T09:05:00Z"));

        assert_eq!(first.values, second.values);
        assert_ne!(first.values, next_bucket.values);
    }

    #[test]
    fn last_known_good_decays_toward_baseline() {
        let generator = FallbackGenerator::new(FallbackConfig::default());
        let mut live = MetricSet::new();
        live.insert(MetricKey::Market(MarketMetric::Price), 280.0)
            .expect("valid");
        let fused = fuse(vec![RankedRecord::new(
            1,
            IntermediateRecord::new("live", at("2024-05-10T09:00:00Z"), live),
        )])
        .expect("one record");
        generator.remember(&fused, at("2024-05-10T09:00:00Z"));

        let price = |raw: &str| {
            generator
                .generate_at(at(raw))
                .get(&MetricKey::Market(MarketMetric::Price))
                .expect("price generated")
        };
        let fresh = price("2024-05-10T09:00:00Z");
        let much_later = price("2024-05-10T15:00:00Z");

        // The walk moves at most 12 * 2% of the span (67.2) from its start.
        assert!(fresh > 280.0 - 67.3, "fresh={fresh}");
        assert!((much_later - 85.0).abs() < 67.3, "much_later={much_later}");
        assert!(fresh > much_later);
    }

    #[test]
    fn generation_mix_sums_to_total_generation() {
        let generator = FallbackGenerator::new(FallbackConfig::default());
        let fused = generator.generate_at(at("2024-05-10T09:00:00Z"));

        let total = fused
            .get(&MetricKey::Market(MarketMetric::Generation))
            .expect("generated");
        let mix: f64 = FuelType::ALL
            .into_iter()
            .filter_map(|fuel| fused.get(&MetricKey::Generation(fuel)))
            .sum();
        assert!((mix - total).abs() < 1.0, "mix={mix} total={total}");
    }

    #[test]
    fn default_bounds_are_valid() {
        assert_eq!(FallbackBounds::default().first_invalid(), None);
        let mut bounds = FallbackBounds::default();
        bounds.frequency = MetricBounds::new(50.2, 49.8, 50.0);
        assert_eq!(bounds.first_invalid(), Some(MarketMetric::Frequency));
    }
}
