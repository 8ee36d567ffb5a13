use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use super::{parse_json, parse_region, RecordBuilder, Transport};
use crate::data_source::{FetchError, FetchFuture, IntermediateRecord, SourceAdapter};
use crate::{FuelType, MarketMetric, ProviderKind, RegionMetric, UtcDateTime};

/// Adapter for system-operator status feeds (demand met, frequency, fuel-wise generation).
#[derive(Clone)]
pub struct GridOperatorAdapter {
    transport: Transport,
}

impl GridOperatorAdapter {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }
}

impl SourceAdapter for GridOperatorAdapter {
    fn name(&self) -> &str {
        self.transport.name()
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::GridOperator
    }

    fn fetch(&self, timeout: Duration) -> FetchFuture<'_> {
        Box::pin(async move {
            let body = self.transport.get_body(timeout).await?;
            parse_grid_status(self.transport.name(), &body, UtcDateTime::now())
        })
    }
}

#[derive(Debug, Deserialize)]
struct GridStatus {
    timestamp: Option<String>,
    demand_met_mw: Option<f64>,
    frequency_hz: Option<f64>,
    #[serde(default)]
    generation: BTreeMap<String, Option<f64>>,
    #[serde(default)]
    regions: Vec<GridRegion>,
}

#[derive(Debug, Deserialize)]
struct GridRegion {
    name: String,
    demand_mw: Option<f64>,
    generation_mw: Option<f64>,
}

/// Parses a grid status payload. Provider fuel labels are folded into fuel families and the
/// renewable share is derived from the folded mix.
pub fn parse_grid_status(
    source: &str,
    body: &str,
    fetched_at: UtcDateTime,
) -> Result<IntermediateRecord, FetchError> {
    let status: GridStatus = parse_json(source, body)?;
    let mut builder = RecordBuilder::new(source, fetched_at);

    match status.timestamp.as_deref() {
        Some(raw) => match UtcDateTime::parse_provider(raw, 0) {
            Ok(observed) => builder.observed_at(Some(observed)),
            Err(_) => builder.missing(),
        },
        None => builder.missing(),
    }

    builder.market(MarketMetric::Demand, status.demand_met_mw);
    builder.market(MarketMetric::Frequency, status.frequency_hz);

    let mut mix: BTreeMap<FuelType, f64> = BTreeMap::new();
    for (label, megawatts) in &status.generation {
        match megawatts.filter(|mw| mw.is_finite() && *mw >= 0.0) {
            Some(mw) => *mix.entry(FuelType::from_label(label)).or_insert(0.0) += mw,
            None => builder.missing(),
        }
    }

    if !mix.is_empty() {
        let total: f64 = mix.values().sum();
        let renewable: f64 = mix
            .iter()
            .filter(|(fuel, _)| fuel.is_renewable())
            .map(|(_, mw)| mw)
            .sum();

        for (fuel, mw) in &mix {
            builder.generation(*fuel, Some(*mw));
        }
        builder.market(MarketMetric::Generation, Some(total));
        builder.market(
            MarketMetric::RenewableShare,
            (total > 0.0).then(|| renewable * 100.0 / total),
        );
    }

    for region in &status.regions {
        let code = parse_region(source, &region.name)?;
        builder.region(&code, RegionMetric::Demand, region.demand_mw);
        builder.region(&code, RegionMetric::Generation, region.generation_mw);
    }

    builder.finish()
}
