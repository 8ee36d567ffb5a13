//! Engine configuration.
//!
//! Loaded once at startup from TOML. Every engine knob has a default, so a file only needs
//! its `[[sources]]` list:
//!
//! ```toml
//! [engine]
//! global_deadline_ms = 5000
//! cache_ttl_secs = 300
//!
//! [breaker]
//! failure_threshold = 3
//! cooldown_secs = 60
//!
//! [[sources]]
//! name = "aemo"
//! kind = "aemo"
//! endpoint = "https://visualisations.aemo.com.au/aemo/apps/api/report/ELEC_NEM_SUMMARY"
//! priority = 1
//! timeout_ms = 3000
//! retry_budget = 3
//! ```
//!
//! The file path comes from `--config` or the `GRIDPULSE_CONFIG` environment variable.
//! API keys are never stored in the file; `api_key_env` names the variable that holds one.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::Backoff;
use crate::cache::CacheConfig;
use crate::circuit_breaker::CircuitBreakerConfig;
use crate::fallback::{FallbackBounds, FallbackConfig};
use crate::orchestrator::OrchestratorConfig;
use crate::registry::SourceDescriptor;
use crate::{ConfigError, MarketMetric, ProviderKind, RegionCode};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "GRIDPULSE_CONFIG";

/// Upper bound for cache lifetimes and breaker cool-downs.
pub const MAX_LIFETIME_SECS: u64 = 7 * 24 * 60 * 60;

/// Upper bound for the cycle deadline, fetch grace, and per-source timeouts.
pub const MAX_WAIT_MS: u64 = 10 * 60 * 1_000;

const AEMO_SUMMARY_URL: &str =
    "https://visualisations.aemo.com.au/aemo/apps/api/report/ELEC_NEM_SUMMARY";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub engine: EngineSettings,
    pub breaker: BreakerSettings,
    pub fallback: FallbackSettings,
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub global_deadline_ms: u64,
    pub fetch_grace_ms: u64,
    pub cache_ttl_secs: u64,
    pub fallback_ttl_secs: u64,
    /// Attempts remembered per source for the reliability score.
    pub failure_window: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            global_deadline_ms: 5_000,
            fetch_grace_ms: 250,
            cache_ttl_secs: 300,
            fallback_ttl_secs: 60,
            failure_window: crate::reliability::DEFAULT_WINDOW,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub cooldown_secs: u64,
    pub backoff_multiplier: f64,
    pub max_cooldown_secs: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown_secs: 60,
            backoff_multiplier: 2.0,
            max_cooldown_secs: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackSettings {
    pub seed: u64,
    pub bucket_secs: u64,
    pub half_life_secs: u64,
    pub regions: Vec<String>,
    pub bounds: FallbackBounds,
}

impl Default for FallbackSettings {
    fn default() -> Self {
        let defaults = FallbackConfig::default();
        Self {
            seed: defaults.seed,
            bucket_secs: defaults.bucket.as_secs(),
            half_life_secs: defaults.half_life.as_secs(),
            regions: defaults
                .regions
                .iter()
                .map(|region| region.as_str().to_owned())
                .collect(),
            bounds: defaults.bounds,
        }
    }
}

/// One `[[sources]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub kind: String,
    pub endpoint: String,
    #[serde(default = "default_priority")]
    pub priority: u32,
    #[serde(default = "default_timeout_ms", alias = "timeoutMs")]
    pub timeout_ms: u64,
    #[serde(default = "default_retry_budget", alias = "retryBudget")]
    pub retry_budget: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_per_minute: Option<u32>,
}

fn at_most(field: impl Into<String>, value: u64, limit: u64) -> Result<(), ConfigError> {
    if value > limit {
        return Err(ConfigError::invalid(field, format!("must not exceed {limit}")));
    }
    Ok(())
}

/// TOML key of a metric's entry in `[fallback.bounds]`.
fn bounds_key(metric: MarketMetric) -> &'static str {
    match metric {
        MarketMetric::Price => "price",
        MarketMetric::Demand => "demand",
        MarketMetric::Generation => "generation",
        MarketMetric::RenewableShare => "renewable_share",
        MarketMetric::Frequency => "frequency",
        MarketMetric::TradedVolume => "traded_volume",
    }
}

fn default_priority() -> u32 {
    100
}

fn default_timeout_ms() -> u64 {
    3_000
}

fn default_retry_budget() -> u32 {
    3
}

impl SourceConfig {
    pub fn descriptor(&self) -> Result<SourceDescriptor, ConfigError> {
        Ok(SourceDescriptor {
            name: self.name.trim().to_owned(),
            kind: self.kind.parse::<ProviderKind>()?,
            endpoint: self.endpoint.trim().to_owned(),
            priority: self.priority,
            timeout: Duration::from_millis(self.timeout_ms),
            retry_budget: self.retry_budget,
            requests_per_minute: self.requests_per_minute,
        })
    }

    /// API key from the environment variable named by `api_key_env`.
    pub fn api_key(&self) -> Option<String> {
        let variable = self.api_key_env.as_deref()?;
        std::env::var(variable)
            .ok()
            .filter(|value| !value.trim().is_empty())
    }
}

impl EngineConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Loads the file named by [`CONFIG_ENV`], or the built-in configuration when unset.
    pub fn load_default() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => Self::load(Path::new(&path)),
            _ => Ok(Self::builtin()),
        }
    }

    /// Public AEMO NEM summary as the only source.
    pub fn builtin() -> Self {
        Self {
            sources: vec![SourceConfig {
                name: String::from("aemo-nem"),
                kind: String::from(ProviderKind::Aemo.as_str()),
                endpoint: String::from(AEMO_SUMMARY_URL),
                priority: 1,
                timeout_ms: default_timeout_ms(),
                retry_budget: default_retry_budget(),
                api_key_env: None,
                requests_per_minute: Some(30),
            }],
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sources.is_empty() {
            return Err(ConfigError::NoSources);
        }

        let mut names = BTreeSet::new();
        for (index, source) in self.sources.iter().enumerate() {
            for (field, value) in [
                ("name", &source.name),
                ("kind", &source.kind),
                ("endpoint", &source.endpoint),
            ] {
                if value.trim().is_empty() {
                    return Err(ConfigError::EmptyField { index, field });
                }
            }
            source.kind.parse::<ProviderKind>()?;

            if source.timeout_ms == 0 {
                return Err(ConfigError::invalid(
                    format!("sources.{}.timeout_ms", source.name),
                    "must be greater than zero",
                ));
            }
            at_most(
                format!("sources.{}.timeout_ms", source.name),
                source.timeout_ms,
                MAX_WAIT_MS,
            )?;
            if !names.insert(source.name.trim()) {
                return Err(ConfigError::DuplicateSource {
                    name: source.name.trim().to_owned(),
                });
            }
        }

        let engine = &self.engine;
        if engine.global_deadline_ms == 0 {
            return Err(ConfigError::invalid(
                "engine.global_deadline_ms",
                "must be greater than zero",
            ));
        }
        if engine.cache_ttl_secs == 0 || engine.fallback_ttl_secs == 0 {
            return Err(ConfigError::invalid(
                "engine.cache_ttl_secs",
                "cache lifetimes must be greater than zero",
            ));
        }
        at_most("engine.global_deadline_ms", engine.global_deadline_ms, MAX_WAIT_MS)?;
        at_most("engine.fetch_grace_ms", engine.fetch_grace_ms, MAX_WAIT_MS)?;
        at_most("engine.cache_ttl_secs", engine.cache_ttl_secs, MAX_LIFETIME_SECS)?;
        at_most("engine.fallback_ttl_secs", engine.fallback_ttl_secs, MAX_LIFETIME_SECS)?;
        if engine.failure_window == 0 {
            return Err(ConfigError::invalid(
                "engine.failure_window",
                "must hold at least one attempt",
            ));
        }

        let breaker = &self.breaker;
        if breaker.failure_threshold == 0 {
            return Err(ConfigError::invalid(
                "breaker.failure_threshold",
                "must be at least 1",
            ));
        }
        if breaker.cooldown_secs == 0 {
            return Err(ConfigError::invalid(
                "breaker.cooldown_secs",
                "must be greater than zero",
            ));
        }
        if !breaker.backoff_multiplier.is_finite() || breaker.backoff_multiplier < 1.0 {
            return Err(ConfigError::invalid(
                "breaker.backoff_multiplier",
                "must be a finite number >= 1",
            ));
        }
        if breaker.max_cooldown_secs < breaker.cooldown_secs {
            return Err(ConfigError::invalid(
                "breaker.max_cooldown_secs",
                "must not be shorter than cooldown_secs",
            ));
        }

        at_most("breaker.max_cooldown_secs", breaker.max_cooldown_secs, MAX_LIFETIME_SECS)?;

        if self.fallback.bucket_secs == 0 {
            return Err(ConfigError::invalid(
                "fallback.bucket_secs",
                "must be greater than zero",
            ));
        }
        if let Some(metric) = self.fallback.bounds.first_invalid() {
            return Err(ConfigError::invalid(
                format!("fallback.bounds.{}", bounds_key(metric)),
                "requires finite min < max with the baseline inside",
            ));
        }
        for region in &self.fallback.regions {
            RegionCode::parse(region)?;
        }

        Ok(())
    }

    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        let cooldown = Duration::from_secs(self.breaker.cooldown_secs);
        let max = Duration::from_secs(self.breaker.max_cooldown_secs);
        CircuitBreakerConfig {
            failure_threshold: self.breaker.failure_threshold,
            cooldown: Backoff::from_multiplier(cooldown, self.breaker.backoff_multiplier, max),
            // Replaced per source by its retry budget.
            max_backoff_steps: default_retry_budget(),
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            global_deadline: Duration::from_millis(self.engine.global_deadline_ms),
            grace: Duration::from_millis(self.engine.fetch_grace_ms),
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            ttl: Duration::from_secs(self.engine.cache_ttl_secs),
            fallback_ttl: Duration::from_secs(self.engine.fallback_ttl_secs),
        }
    }

    pub fn fallback_config(&self) -> Result<FallbackConfig, ConfigError> {
        let regions = self
            .fallback
            .regions
            .iter()
            .map(|region| RegionCode::parse(region))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(FallbackConfig {
            seed: self.fallback.seed,
            bucket: Duration::from_secs(self.fallback.bucket_secs),
            half_life: Duration::from_secs(self.fallback.half_life_secs),
            regions,
            bounds: self.fallback.bounds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_config_is_valid() {
        let config = EngineConfig::builtin();
        assert!(config.validate().is_ok());
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.fallback_config().expect("valid").regions.len(), 5);
    }

    #[test]
    fn unit_multiplier_gives_fixed_cooldown() {
        let mut config = EngineConfig::builtin();
        config.breaker.backoff_multiplier = 1.0;
        assert_eq!(
            config.breaker_config().cooldown,
            Backoff::Fixed {
                delay: Duration::from_secs(60)
            }
        );
    }

    #[test]
    fn camel_case_source_keys_are_accepted() {
        let config = EngineConfig::from_toml_str(
            r#"
            [[sources]]
            name = "mirror"
            kind = "generic"
            endpoint = "https://mirror.test/feed"
            priority = 2
            timeoutMs = 1500
            retryBudget = 1
            "#,
        )
        .expect("valid config");

        let descriptor = config.sources[0].descriptor().expect("valid source");
        assert_eq!(descriptor.timeout, Duration::from_millis(1500));
        assert_eq!(descriptor.retry_budget, 1);
        assert_eq!(descriptor.kind, ProviderKind::Generic);
    }
}
