use std::time::Duration;

use serde::Deserialize;

use super::{parse_json, parse_region, RecordBuilder, Transport};
use crate::data_source::{FetchError, FetchFuture, IntermediateRecord, SourceAdapter};
use crate::{MarketMetric, ProviderKind, RegionMetric, UtcDateTime};

/// Adapter for power-exchange clearing feeds (market clearing price and volume per block).
#[derive(Clone)]
pub struct ExchangeAdapter {
    transport: Transport,
}

impl ExchangeAdapter {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }
}

impl SourceAdapter for ExchangeAdapter {
    fn name(&self) -> &str {
        self.transport.name()
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Exchange
    }

    fn fetch(&self, timeout: Duration) -> FetchFuture<'_> {
        Box::pin(async move {
            let body = self.transport.get_body(timeout).await?;
            parse_exchange_feed(self.transport.name(), &body, UtcDateTime::now())
        })
    }
}

#[derive(Debug, Deserialize)]
struct ExchangeFeed {
    updated_at: Option<String>,
    #[serde(default)]
    blocks: Vec<ClearingBlock>,
    #[serde(default)]
    areas: Vec<AreaPrice>,
}

#[derive(Debug, Deserialize)]
struct ClearingBlock {
    block: Option<u32>,
    mcp: Option<f64>,
    mcv: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct AreaPrice {
    area: String,
    mcp: Option<f64>,
}

/// Parses a clearing feed. Price is the latest block's clearing price and traded volume is
/// the sum of cleared volume over all blocks.
pub fn parse_exchange_feed(
    source: &str,
    body: &str,
    fetched_at: UtcDateTime,
) -> Result<IntermediateRecord, FetchError> {
    let feed: ExchangeFeed = parse_json(source, body)?;
    if feed.blocks.is_empty() {
        return Err(FetchError::parse(format!("{source} payload has no clearing blocks")));
    }

    let mut builder = RecordBuilder::new(source, fetched_at);
    match feed.updated_at.as_deref() {
        Some(raw) => match UtcDateTime::parse_provider(raw, 0) {
            Ok(observed) => builder.observed_at(Some(observed)),
            Err(_) => builder.missing(),
        },
        None => builder.missing(),
    }

    // Blocks without a number sort by feed position; later entries win ties.
    let latest = feed
        .blocks
        .iter()
        .enumerate()
        .max_by_key(|(position, block)| (block.block, *position))
        .map(|(_, block)| block);
    builder.market(MarketMetric::Price, latest.and_then(|block| block.mcp));

    let volumes: Vec<f64> = feed
        .blocks
        .iter()
        .filter_map(|block| block.mcv)
        .filter(|volume| volume.is_finite() && *volume >= 0.0)
        .collect();
    let traded_volume = (!volumes.is_empty()).then(|| volumes.iter().sum());
    builder.market(MarketMetric::TradedVolume, traded_volume);

    for area in &feed.areas {
        let region = parse_region(source, &area.area)?;
        builder.region(&region, RegionMetric::Price, area.mcp);
    }

    builder.finish()
}
