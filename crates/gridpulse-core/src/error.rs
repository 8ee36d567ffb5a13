use std::path::PathBuf;

use thiserror::Error;

/// Validation errors raised while building domain values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("region code cannot be empty")]
    EmptyRegion,
    #[error("region code length {len} exceeds max {max}")]
    RegionTooLong { len: usize, max: usize },
    #[error("region code contains invalid character '{ch}' at index {index}")]
    RegionInvalidChar { ch: char, index: usize },

    #[error("invalid provider kind '{value}', expected one of aemo, exchange, grid_operator, generic")]
    InvalidProviderKind { value: String },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },
    #[error("unrecognized timestamp '{value}'")]
    InvalidTimestamp { value: String },

    #[error("metric '{field}' must be finite")]
    NonFiniteValue { field: String },
    #[error("metric '{field}' must be non-negative")]
    NegativeValue { field: String },
}

/// Errors produced while loading or validating engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("at least one source must be configured")]
    NoSources,

    #[error("source '{name}' is configured more than once")]
    DuplicateSource { name: String },

    #[error("source #{index}: field '{field}' cannot be empty")]
    EmptyField { index: usize, field: &'static str },

    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Internal aggregation-cycle conditions. Never surfaced to snapshot consumers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CycleError {
    #[error("all sources exhausted: {attempted} attempted, {skipped} skipped, none usable")]
    AllSourcesExhausted { attempted: usize, skipped: usize },
}
