use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

const MAX_REGION_LEN: usize = 32;

/// Generation fuel families reported in the generation mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FuelType {
    Coal,
    Gas,
    Hydro,
    Wind,
    Solar,
    Nuclear,
    Battery,
    Biomass,
    Other,
}

impl FuelType {
    pub const ALL: [Self; 9] = [
        Self::Coal,
        Self::Gas,
        Self::Hydro,
        Self::Wind,
        Self::Solar,
        Self::Nuclear,
        Self::Battery,
        Self::Biomass,
        Self::Other,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Coal => "coal",
            Self::Gas => "gas",
            Self::Hydro => "hydro",
            Self::Wind => "wind",
            Self::Solar => "solar",
            Self::Nuclear => "nuclear",
            Self::Battery => "battery",
            Self::Biomass => "biomass",
            Self::Other => "other",
        }
    }

    pub const fn is_renewable(self) -> bool {
        matches!(
            self,
            Self::Hydro | Self::Wind | Self::Solar | Self::Biomass
        )
    }

    /// Maps free-form provider fuel labels ("black_coal", "Rooftop Solar", "thermal") onto
    /// a fuel family. Unknown labels land in [`FuelType::Other`].
    pub fn from_label(label: &str) -> Self {
        let label = label.trim().to_ascii_lowercase();
        let has = |needle: &str| label.contains(needle);

        if has("coal") || has("lignite") || label == "thermal" {
            Self::Coal
        } else if has("gas") || has("ccgt") || has("ocgt") || has("distillate") {
            Self::Gas
        } else if has("hydro") {
            Self::Hydro
        } else if has("wind") {
            Self::Wind
        } else if has("solar") || label == "pv" {
            Self::Solar
        } else if has("nuclear") {
            Self::Nuclear
        } else if has("battery") || has("storage") {
            Self::Battery
        } else if has("bio") {
            Self::Biomass
        } else {
            Self::Other
        }
    }
}

impl Display for FuelType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// System-wide market metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MarketMetric {
    /// Spot/clearing price per MWh.
    Price,
    /// Operational demand in MW.
    Demand,
    /// Total generation in MW.
    Generation,
    /// Renewable share of generation, percent.
    RenewableShare,
    /// System frequency in Hz.
    Frequency,
    /// Traded volume in MWh.
    TradedVolume,
}

impl MarketMetric {
    pub const ALL: [Self; 6] = [
        Self::Price,
        Self::Demand,
        Self::Generation,
        Self::RenewableShare,
        Self::Frequency,
        Self::TradedVolume,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Price => "currentPrice",
            Self::Demand => "totalDemand",
            Self::Generation => "totalGeneration",
            Self::RenewableShare => "renewableShare",
            Self::Frequency => "frequency",
            Self::TradedVolume => "tradedVolume",
        }
    }

    const fn allows_negative(self) -> bool {
        matches!(self, Self::Price)
    }
}

/// Per-region metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RegionMetric {
    Price,
    Demand,
    Generation,
    NetInterchange,
}

impl RegionMetric {
    pub const ALL: [Self; 4] = [
        Self::Price,
        Self::Demand,
        Self::Generation,
        Self::NetInterchange,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Price => "price",
            Self::Demand => "demand",
            Self::Generation => "generation",
            Self::NetInterchange => "netInterchange",
        }
    }

    const fn allows_negative(self) -> bool {
        matches!(self, Self::Price | Self::NetInterchange)
    }
}

/// Validated market region identifier (e.g. `NSW1`, `North`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RegionCode(String);

impl RegionCode {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let value = input.trim();
        if value.is_empty() {
            return Err(ValidationError::EmptyRegion);
        }
        if value.len() > MAX_REGION_LEN {
            return Err(ValidationError::RegionTooLong {
                len: value.len(),
                max: MAX_REGION_LEN,
            });
        }
        for (index, ch) in value.chars().enumerate() {
            if !(ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | ' ')) {
                return Err(ValidationError::RegionInvalidChar { ch, index });
            }
        }

        Ok(Self(value.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RegionCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RegionCode {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RegionCode> for String {
    fn from(value: RegionCode) -> Self {
        value.0
    }
}

/// One logical field of a snapshot.
///
/// The derived ordering is the canonical field order used for fusion and serialization.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetricKey {
    Market(MarketMetric),
    Generation(FuelType),
    Region(RegionCode, RegionMetric),
}

impl MetricKey {
    /// Dotted path of the field inside the snapshot `data` document.
    pub fn path(&self) -> String {
        match self {
            Self::Market(metric) => format!("marketOverview.{}", metric.as_str()),
            Self::Generation(fuel) => format!("marketOverview.generationMix.{}", fuel.as_str()),
            Self::Region(region, metric) => {
                format!("regionalData.{}.{}", region.as_str(), metric.as_str())
            }
        }
    }

    fn allows_negative(&self) -> bool {
        match self {
            Self::Market(metric) => metric.allows_negative(),
            Self::Generation(_) => false,
            Self::Region(_, metric) => metric.allows_negative(),
        }
    }

    /// Checks a raw provider value against the field's domain.
    pub fn validate(&self, value: f64) -> Result<f64, ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::NonFiniteValue { field: self.path() });
        }
        if value < 0.0 && !self.allows_negative() {
            return Err(ValidationError::NegativeValue { field: self.path() });
        }
        Ok(value)
    }
}

impl Display for MetricKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.path())
    }
}

/// Provider-normalized metric values keyed in canonical order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricSet(BTreeMap<MetricKey, f64>);

impl MetricSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a validated value, replacing any previous value for the same key.
    pub fn insert(&mut self, key: MetricKey, value: f64) -> Result<(), ValidationError> {
        let value = key.validate(value)?;
        self.0.insert(key, value);
        Ok(())
    }

    pub fn get(&self, key: &MetricKey) -> Option<f64> {
        self.0.get(key).copied()
    }

    pub fn market(&self, metric: MarketMetric) -> Option<f64> {
        self.get(&MetricKey::Market(metric))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MetricKey, f64)> {
        self.0.iter().map(|(key, value)| (key, *value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fuel_labels_map_to_families() {
        assert_eq!(FuelType::from_label("Black Coal"), FuelType::Coal);
        assert_eq!(FuelType::from_label("gas_ccgt"), FuelType::Gas);
        assert_eq!(FuelType::from_label("Rooftop Solar"), FuelType::Solar);
        assert_eq!(FuelType::from_label("battery_discharging"), FuelType::Battery);
        assert_eq!(FuelType::from_label("pumps"), FuelType::Other);
    }

    #[test]
    fn metric_paths_follow_snapshot_layout() {
        let region = RegionCode::parse("NSW1").expect("valid region");
        assert_eq!(
            MetricKey::Market(MarketMetric::Price).path(),
            "marketOverview.currentPrice"
        );
        assert_eq!(
            MetricKey::Generation(FuelType::Wind).path(),
            "marketOverview.generationMix.wind"
        );
        assert_eq!(
            MetricKey::Region(region, RegionMetric::NetInterchange).path(),
            "regionalData.NSW1.netInterchange"
        );
    }

    #[test]
    fn metric_set_rejects_out_of_domain_values() {
        let mut set = MetricSet::new();
        assert!(set.insert(MetricKey::Market(MarketMetric::Price), -35.0).is_ok());
        assert!(matches!(
            set.insert(MetricKey::Market(MarketMetric::Demand), -1.0),
            Err(ValidationError::NegativeValue { .. })
        ));
        assert!(matches!(
            set.insert(MetricKey::Generation(FuelType::Coal), f64::NAN),
            Err(ValidationError::NonFiniteValue { .. })
        ));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn region_codes_are_validated() {
        assert!(RegionCode::parse("  ").is_err());
        assert!(RegionCode::parse("NSW1;drop").is_err());
        assert_eq!(RegionCode::parse(" North East ").expect("valid").as_str(), "North East");
    }
}
