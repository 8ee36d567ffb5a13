use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use super::{parse_json, parse_region, RecordBuilder, Transport};
use crate::data_source::{FetchError, FetchFuture, IntermediateRecord, SourceAdapter};
use crate::{FuelType, MarketMetric, ProviderKind, RegionMetric, UtcDateTime};

/// Adapter for self-hosted feeds that already publish the canonical field names.
#[derive(Clone)]
pub struct GenericAdapter {
    transport: Transport,
}

impl GenericAdapter {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }
}

impl SourceAdapter for GenericAdapter {
    fn name(&self) -> &str {
        self.transport.name()
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Generic
    }

    fn fetch(&self, timeout: Duration) -> FetchFuture<'_> {
        Box::pin(async move {
            let body = self.transport.get_body(timeout).await?;
            parse_generic_feed(self.transport.name(), &body, UtcDateTime::now())
        })
    }
}

#[derive(Debug, Deserialize)]
struct GenericFeed {
    as_of: Option<String>,
    price: Option<f64>,
    demand: Option<f64>,
    generation: Option<f64>,
    renewable_share: Option<f64>,
    frequency: Option<f64>,
    traded_volume: Option<f64>,
    #[serde(default)]
    generation_mix: BTreeMap<String, f64>,
    #[serde(default)]
    regions: BTreeMap<String, GenericRegion>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenericRegion {
    price: Option<f64>,
    demand: Option<f64>,
    generation: Option<f64>,
    #[serde(alias = "net_interchange")]
    net_interchange: Option<f64>,
}

/// Parses the canonical flat feed. Only fields present in the payload are expected, so a
/// sparse but well-formed feed keeps full confidence.
pub fn parse_generic_feed(
    source: &str,
    body: &str,
    fetched_at: UtcDateTime,
) -> Result<IntermediateRecord, FetchError> {
    let feed: GenericFeed = parse_json(source, body)?;
    let mut builder = RecordBuilder::new(source, fetched_at);

    if let Some(raw) = feed.as_of.as_deref() {
        match UtcDateTime::parse_provider(raw, 0) {
            Ok(observed) => builder.observed_at(Some(observed)),
            Err(_) => builder.missing(),
        }
    }

    let market = [
        (MarketMetric::Price, feed.price),
        (MarketMetric::Demand, feed.demand),
        (MarketMetric::Generation, feed.generation),
        (MarketMetric::RenewableShare, feed.renewable_share),
        (MarketMetric::Frequency, feed.frequency),
        (MarketMetric::TradedVolume, feed.traded_volume),
    ];
    for (metric, value) in market {
        if value.is_some() {
            builder.market(metric, value);
        }
    }

    let mut mix: BTreeMap<FuelType, f64> = BTreeMap::new();
    for (label, megawatts) in &feed.generation_mix {
        if megawatts.is_finite() && *megawatts >= 0.0 {
            *mix.entry(FuelType::from_label(label)).or_insert(0.0) += megawatts;
        } else {
            builder.missing();
        }
    }
    for (fuel, megawatts) in mix {
        builder.generation(fuel, Some(megawatts));
    }

    for (name, region) in &feed.regions {
        let code = parse_region(source, name)?;
        let fields = [
            (RegionMetric::Price, region.price),
            (RegionMetric::Demand, region.demand),
            (RegionMetric::Generation, region.generation),
            (RegionMetric::NetInterchange, region.net_interchange),
        ];
        for (metric, value) in fields {
            if value.is_some() {
                builder.region(&code, metric, value);
            }
        }
    }

    builder.finish()
}
