use std::time::Duration;

use serde::Deserialize;

use super::{parse_json, parse_region, RecordBuilder, Transport};
use crate::data_source::{FetchError, FetchFuture, IntermediateRecord, SourceAdapter};
use crate::{MarketMetric, ProviderKind, RegionMetric, UtcDateTime};

/// NEM settlement dates are published in market time (AEST, no daylight saving).
const NEM_OFFSET_HOURS: i8 = 10;

/// Adapter for the AEMO `ELEC_NEM_SUMMARY` report.
#[derive(Clone)]
pub struct AemoAdapter {
    transport: Transport,
}

impl AemoAdapter {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }
}

impl SourceAdapter for AemoAdapter {
    fn name(&self) -> &str {
        self.transport.name()
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Aemo
    }

    fn fetch(&self, timeout: Duration) -> FetchFuture<'_> {
        Box::pin(async move {
            let body = self.transport.get_body(timeout).await?;
            parse_nem_summary(self.transport.name(), &body, UtcDateTime::now())
        })
    }
}

#[derive(Debug, Deserialize)]
struct NemSummary {
    #[serde(rename = "ELEC_NEM_SUMMARY", default)]
    rows: Vec<NemRegionRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct NemRegionRow {
    settlementdate: Option<String>,
    regionid: String,
    price: Option<f64>,
    totaldemand: Option<f64>,
    netinterchange: Option<f64>,
    scheduledgeneration: Option<f64>,
    semischeduledgeneration: Option<f64>,
}

impl NemRegionRow {
    fn generation(&self) -> Option<f64> {
        match (self.scheduledgeneration, self.semischeduledgeneration) {
            (None, None) => None,
            (scheduled, semi) => Some(scheduled.unwrap_or(0.0) + semi.unwrap_or(0.0)),
        }
    }
}

/// Parses a NEM summary payload into one record.
///
/// Market price is the demand-weighted mean of regional prices; demand and generation are
/// summed across regions.
pub fn parse_nem_summary(
    source: &str,
    body: &str,
    fetched_at: UtcDateTime,
) -> Result<IntermediateRecord, FetchError> {
    let summary: NemSummary = parse_json(source, body)?;
    if summary.rows.is_empty() {
        return Err(FetchError::parse(format!(
            "{source} payload has no ELEC_NEM_SUMMARY rows"
        )));
    }

    let mut builder = RecordBuilder::new(source, fetched_at);
    let mut weighted_price = 0.0;
    let mut priced_demand = 0.0;
    let mut prices = Vec::new();
    let mut total_demand: Option<f64> = None;
    let mut total_generation: Option<f64> = None;

    for row in &summary.rows {
        match row.settlementdate.as_deref() {
            Some(raw) => match UtcDateTime::parse_provider(raw, NEM_OFFSET_HOURS) {
                Ok(observed) => builder.observed_at(Some(observed)),
                Err(_) => builder.missing(),
            },
            None => builder.missing(),
        }

        let region = parse_region(source, &row.regionid)?;
        builder.region(&region, RegionMetric::Price, row.price);
        builder.region(&region, RegionMetric::Demand, row.totaldemand);
        builder.region(&region, RegionMetric::Generation, row.generation());
        builder.region(&region, RegionMetric::NetInterchange, row.netinterchange);

        if let Some(price) = row.price.filter(|price| price.is_finite()) {
            prices.push(price);
            if let Some(demand) = row.totaldemand.filter(|d| d.is_finite() && *d > 0.0) {
                weighted_price += price * demand;
                priced_demand += demand;
            }
        }
        if let Some(demand) = row.totaldemand.filter(|d| d.is_finite() && *d >= 0.0) {
            *total_demand.get_or_insert(0.0) += demand;
        }
        if let Some(generation) = row.generation().filter(|g| g.is_finite() && *g >= 0.0) {
            *total_generation.get_or_insert(0.0) += generation;
        }
    }

    let market_price = if priced_demand > 0.0 {
        Some(weighted_price / priced_demand)
    } else if prices.is_empty() {
        None
    } else {
        Some(prices.iter().sum::<f64>() / prices.len() as f64)
    };

    builder.market(MarketMetric::Price, market_price);
    builder.market(MarketMetric::Demand, total_demand);
    builder.market(MarketMetric::Generation, total_generation);
    builder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MetricKey, RegionCode};

    const FIXTURE: &str = r#"{
        "ELEC_NEM_SUMMARY": [
            {"SETTLEMENTDATE": "2024-03-01T10:30:00", "REGIONID": "NSW1", "PRICE": 100.0,
             "TOTALDEMAND": 3000.0, "NETINTERCHANGE": -250.5,
             "SCHEDULEDGENERATION": 2500.0, "SEMISCHEDULEDGENERATION": 700.0},
            {"SETTLEMENTDATE": "2024-03-01T10:30:00", "REGIONID": "SA1", "PRICE": 40.0,
             "TOTALDEMAND": 1000.0, "NETINTERCHANGE": 120.0,
             "SCHEDULEDGENERATION": 400.0, "SEMISCHEDULEDGENERATION": 500.0}
        ]
    }"#;

    #[test]
    fn summary_rows_become_market_and_regional_metrics() {
        let record = parse_nem_summary("aemo", FIXTURE, UtcDateTime::now()).expect("fixture parses");

        assert_eq!(record.metrics.market(MarketMetric::Price), Some(85.0));
        assert_eq!(record.metrics.market(MarketMetric::Demand), Some(4000.0));
        assert_eq!(record.metrics.market(MarketMetric::Generation), Some(4100.0));

        let sa = RegionCode::parse("SA1").expect("valid region");
        assert_eq!(
            record.metrics.get(&MetricKey::Region(sa, RegionMetric::Generation)),
            Some(900.0)
        );
        assert_eq!(record.parse_confidence, 1.0);
    }

    #[test]
    fn settlement_time_is_market_time() {
        let record = parse_nem_summary("aemo", FIXTURE, UtcDateTime::now()).expect("fixture parses");
        let observed = record.observed_at.expect("settlement date present");
        assert_eq!(observed.format_rfc3339(), "2024-03-01T00:30:00Z");
    }

    #[test]
    fn missing_rows_are_a_parse_error() {
        let error = parse_nem_summary("aemo", r#"{"ELEC_NEM_SUMMARY": []}"#, UtcDateTime::now())
            .expect_err("no rows");
        assert_eq!(error.code(), "source.parse");
    }
}
