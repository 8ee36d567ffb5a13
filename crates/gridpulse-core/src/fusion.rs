//! Field-level merge of successful records.
//!
//! Records are ranked by `(priority asc, observed_at desc, fetched_at desc, source asc)`;
//! records without an observation time rank after those with one at equal priority. Each
//! field takes its value from the best-ranked record that reported it, and lists every
//! reporting source in rank order. The ranking is a total order over distinct sources, so
//! the result does not depend on the order records arrive in.

use std::cmp::{Ordering, Reverse};
use std::collections::BTreeMap;

use crate::data_source::IntermediateRecord;
use crate::MetricKey;

/// A successful record tagged with its source's configured priority.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedRecord {
    pub priority: u32,
    pub record: IntermediateRecord,
}

impl RankedRecord {
    pub fn new(priority: u32, record: IntermediateRecord) -> Self {
        Self { priority, record }
    }

    fn rank_cmp(&self, other: &Self) -> Ordering {
        let key = |ranked: &Self| {
            (
                ranked.priority,
                // `None < Some`, so reversing puts observed records first, newest first.
                Reverse(ranked.record.observed_at),
                Reverse(ranked.record.fetched_at),
            )
        };
        key(self)
            .cmp(&key(other))
            .then_with(|| self.record.source.cmp(&other.record.source))
    }
}

/// Winning value for one field with its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedValue {
    pub value: f64,
    pub selected: String,
    /// Every source that reported the field, best-ranked first.
    pub contributors: Vec<String>,
}

/// Merged view over all contributing records.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedMetrics {
    pub values: BTreeMap<MetricKey, FusedValue>,
    /// Contributing records in rank order.
    pub records: Vec<RankedRecord>,
}

impl FusedMetrics {
    pub fn get(&self, key: &MetricKey) -> Option<f64> {
        self.values.get(key).map(|fused| fused.value)
    }

    /// Wraps one record whose source supplies every field.
    pub fn single(ranked: RankedRecord) -> Self {
        let source = &ranked.record.source;
        let values = ranked
            .record
            .metrics
            .iter()
            .map(|(key, value)| {
                (
                    key.clone(),
                    FusedValue {
                        value,
                        selected: source.clone(),
                        contributors: vec![source.clone()],
                    },
                )
            })
            .collect();

        Self {
            values,
            records: vec![ranked],
        }
    }

    /// Contributing source names in rank order.
    pub fn sources(&self) -> Vec<String> {
        self.records
            .iter()
            .map(|ranked| ranked.record.source.clone())
            .collect()
    }
}

/// Merges records; `None` when no record was supplied.
pub fn fuse(mut records: Vec<RankedRecord>) -> Option<FusedMetrics> {
    if records.is_empty() {
        return None;
    }

    records.sort_by(RankedRecord::rank_cmp);

    let mut values: BTreeMap<MetricKey, FusedValue> = BTreeMap::new();
    for ranked in &records {
        let source = &ranked.record.source;
        for (key, value) in ranked.record.metrics.iter() {
            match values.get_mut(key) {
                Some(fused) => fused.contributors.push(source.clone()),
                None => {
                    values.insert(
                        key.clone(),
                        FusedValue {
                            value,
                            selected: source.clone(),
                            contributors: vec![source.clone()],
                        },
                    );
                }
            }
        }
    }

    Some(FusedMetrics { values, records })
}
