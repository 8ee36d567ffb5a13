//! Provider adapters.
//!
//! Each adapter owns one provider's payload shape. Transport handling is shared through
//! [`Transport`]; parsing is a pure function per provider so fixtures can be tested
//! without a network.

mod aemo;
mod exchange;
mod generic;
mod grid_operator;

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::data_source::{FetchError, IntermediateRecord, SourceAdapter};
use crate::http_client::{HttpAuth, HttpClient, HttpRequest};
use crate::{
    FuelType, MarketMetric, MetricKey, MetricSet, ProviderKind, RegionCode, RegionMetric,
    UtcDateTime,
};

pub use aemo::{parse_nem_summary, AemoAdapter};
pub use exchange::{parse_exchange_feed, ExchangeAdapter};
pub use generic::{parse_generic_feed, GenericAdapter};
pub use grid_operator::{parse_grid_status, GridOperatorAdapter};

/// Builds the adapter for a provider family.
pub fn build_adapter(
    kind: ProviderKind,
    name: impl Into<String>,
    endpoint: impl Into<String>,
    http_client: Arc<dyn HttpClient>,
    auth: HttpAuth,
) -> Arc<dyn SourceAdapter> {
    let transport = Transport::new(name, endpoint, http_client, auth);
    match kind {
        ProviderKind::Aemo => Arc::new(AemoAdapter::new(transport)),
        ProviderKind::Exchange => Arc::new(ExchangeAdapter::new(transport)),
        ProviderKind::GridOperator => Arc::new(GridOperatorAdapter::new(transport)),
        ProviderKind::Generic => Arc::new(GenericAdapter::new(transport)),
    }
}

/// Shared request plumbing for a single configured source.
#[derive(Clone)]
pub struct Transport {
    name: String,
    endpoint: String,
    http_client: Arc<dyn HttpClient>,
    auth: HttpAuth,
}

impl Transport {
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        http_client: Arc<dyn HttpClient>,
        auth: HttpAuth,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            http_client,
            auth,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Issues the single GET for this fetch and returns the body of a 2xx response.
    pub async fn get_body(&self, timeout: Duration) -> Result<String, FetchError> {
        let request = HttpRequest::get(&self.endpoint)
            .with_header("accept", "application/json")
            .with_auth(&self.auth)
            .with_timeout(timeout);

        let response = self.http_client.execute(request).await?;
        if !response.is_success() {
            return Err(FetchError::http_status(response.status));
        }

        debug!(source = %self.name, bytes = response.body.len(), "payload received");
        Ok(response.body)
    }
}

/// Accumulates parsed fields and tracks how many expected fields were usable.
pub(crate) struct RecordBuilder {
    source: String,
    fetched_at: UtcDateTime,
    observed_at: Option<UtcDateTime>,
    metrics: MetricSet,
    expected: usize,
    populated: usize,
}

impl RecordBuilder {
    pub(crate) fn new(source: &str, fetched_at: UtcDateTime) -> Self {
        Self {
            source: source.to_owned(),
            fetched_at,
            observed_at: None,
            metrics: MetricSet::new(),
            expected: 0,
            populated: 0,
        }
    }

    pub(crate) fn observed_at(&mut self, observed_at: Option<UtcDateTime>) {
        self.observed_at = match (self.observed_at, observed_at) {
            (Some(current), Some(candidate)) => Some(current.max(candidate)),
            (current, candidate) => current.or(candidate),
        };
    }

    pub(crate) fn market(&mut self, metric: MarketMetric, value: Option<f64>) {
        self.field(MetricKey::Market(metric), value);
    }

    pub(crate) fn generation(&mut self, fuel: FuelType, value: Option<f64>) {
        self.field(MetricKey::Generation(fuel), value);
    }

    pub(crate) fn region(&mut self, region: &RegionCode, metric: RegionMetric, value: Option<f64>) {
        self.field(MetricKey::Region(region.clone(), metric), value);
    }

    /// Counts a field that the payload should have carried but could not be mapped.
    pub(crate) fn missing(&mut self) {
        self.expected += 1;
    }

    fn field(&mut self, key: MetricKey, value: Option<f64>) {
        self.expected += 1;
        let Some(value) = value else {
            return;
        };

        match self.metrics.insert(key, value) {
            Ok(()) => self.populated += 1,
            Err(error) => {
                debug!(source = %self.source, %error, "dropping out-of-domain field");
            }
        }
    }

    pub(crate) fn finish(self) -> Result<IntermediateRecord, FetchError> {
        if self.metrics.is_empty() {
            return Err(FetchError::parse(format!(
                "{} payload contained no usable metrics",
                self.source
            )));
        }

        let confidence = if self.expected == 0 {
            1.0
        } else {
            self.populated as f64 / self.expected as f64
        };

        Ok(IntermediateRecord::new(self.source, self.fetched_at, self.metrics)
            .with_observed_at(self.observed_at)
            .with_parse_confidence(confidence))
    }
}

pub(crate) fn parse_json<T>(source: &str, body: &str) -> Result<T, FetchError>
where
    T: serde::de::DeserializeOwned,
{
    serde_json::from_str(body)
        .map_err(|error| FetchError::parse(format!("failed to parse {source} payload: {error}")))
}

pub(crate) fn parse_region(source: &str, raw: &str) -> Result<RegionCode, FetchError> {
    RegionCode::parse(raw)
        .map_err(|error| FetchError::parse(format!("{source} payload has bad region: {error}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_confidence_reflects_missing_and_rejected_fields() {
        let mut builder = RecordBuilder::new("feed", UtcDateTime::now());
        builder.market(MarketMetric::Price, Some(91.0));
        builder.market(MarketMetric::Demand, None);
        builder.market(MarketMetric::Generation, Some(-4.0));
        builder.missing();

        let record = builder.finish().expect("price alone is usable");
        assert_eq!(record.metrics.len(), 1);
        assert!((record.parse_confidence - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_builder_is_a_parse_error() {
        let builder = RecordBuilder::new("feed", UtcDateTime::now());
        let error = builder.finish().expect_err("nothing usable");
        assert_eq!(error.kind(), crate::FetchErrorKind::Parse);
    }

    #[test]
    fn latest_observation_wins() {
        let early = UtcDateTime::parse("2024-01-01T00:00:00Z").expect("valid");
        let late = UtcDateTime::parse("2024-01-01T00:05:00Z").expect("valid");
        let mut builder = RecordBuilder::new("feed", UtcDateTime::now());
        builder.observed_at(Some(late));
        builder.observed_at(Some(early));
        builder.observed_at(None);
        builder.market(MarketMetric::Price, Some(1.0));

        assert_eq!(builder.finish().expect("usable").observed_at, Some(late));
    }
}
