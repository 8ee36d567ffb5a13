//! # GridPulse Core
//!
//! Resilient multi-source aggregation of energy market data.
//!
//! ## Overview
//!
//! The engine polls several independently configured upstream sources concurrently,
//! normalizes each payload into a common metric vocabulary, and fuses the results into one
//! snapshot document with per-field provenance and quality scores:
//!
//! - **Source adapters** for AEMO-style summaries, exchange feeds, grid operator status
//!   feeds, and flat generic JSON
//! - **Circuit breakers** with escalating cool-downs so failing sources are skipped
//! - **Global deadline** bounding every cycle regardless of upstream latency
//! - **Priority fusion** at field granularity with deterministic tie-breaking
//! - **Deterministic simulated fallback** when no source delivers
//! - **Stale-while-revalidate cache** with single-flight refresh
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Provider payload adapters |
//! | [`cache`] | Snapshot cache |
//! | [`circuit_breaker`] | Per-source circuit breaker |
//! | [`config`] | TOML engine configuration |
//! | [`data_source`] | Adapter contract and fetch results |
//! | [`domain`] | Metric vocabulary and timestamps |
//! | [`engine`] | Aggregation facade |
//! | [`fallback`] | Simulated data generator |
//! | [`fusion`] | Field-level record merge |
//! | [`health`] | Breaker and cache health views |
//! | [`orchestrator`] | Concurrent fetch fan-out |
//! | [`registry`] | Configured sources and admission |
//! | [`reliability`] | Rolling outcome windows and scores |
//! | [`snapshot`] | Snapshot document |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use gridpulse_core::{AggregationEngine, EngineConfig, ReqwestHttpClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig::load_default()?;
//!     let engine = AggregationEngine::from_config(&config, Arc::new(ReqwestHttpClient::new()))?;
//!
//!     let snapshot = engine.get_snapshot().await;
//!     println!("{}", serde_json::to_string_pretty(&*snapshot)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐
//! │ AggregationEng. │────▶│ Snapshot Cache   │
//! └────────┬────────┘     └──────────────────┘
//!          │ cycle
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Source Registry │────▶│ Circuit Breakers │
//! └────────┬────────┘     └──────────────────┘
//!          │ admissions
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Orchestrator    │────▶│ Source Adapters  │──▶ HTTP client
//! └────────┬────────┘     └──────────────────┘
//!          │ results
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Fusion          │ or  │ Fallback         │
//! └─────────────────┘     └──────────────────┘
//! ```
//!
//! ## Security
//!
//! - API keys are read from environment variables only and never logged
//! - All HTTP requests use TLS via rustls

pub mod adapters;
pub mod backoff;
pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod data_source;
pub mod domain;
pub mod engine;
pub mod error;
pub mod fallback;
pub mod fusion;
pub mod health;
pub mod http_client;
pub mod orchestrator;
pub mod registry;
pub mod reliability;
pub mod snapshot;
pub mod source;
pub mod throttling;

// Adapter implementations
pub use adapters::{
    build_adapter, AemoAdapter, ExchangeAdapter, GenericAdapter, GridOperatorAdapter, Transport,
};

// Resilience
pub use backoff::Backoff;
pub use circuit_breaker::{
    AttemptPermit, CircuitBreaker, CircuitBreakerConfig, CircuitState, CircuitStatus,
};
pub use throttling::RequestQuota;

// Caching
pub use cache::{CacheConfig, CacheLookup, CacheStatus, RefreshOutcome, SnapshotCache};

// Configuration
pub use config::{EngineConfig, SourceConfig};

// Adapter contract
pub use data_source::{
    FetchError, FetchErrorKind, FetchFuture, FetchResult, IntermediateRecord, SourceAdapter,
};

// Domain vocabulary
pub use domain::{FuelType, MarketMetric, MetricKey, MetricSet, RegionCode, RegionMetric, UtcDateTime};

// Engine
pub use engine::AggregationEngine;
pub use health::{CacheHealth, EngineHealth, SourceHealth};

// Error types
pub use error::{ConfigError, CycleError, ValidationError};

// Fusion and fallback
pub use fallback::{FallbackBounds, FallbackConfig, FallbackGenerator, MetricBounds};
pub use fusion::{fuse, FusedMetrics, FusedValue, RankedRecord};

// HTTP client types
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpErrorKind, HttpRequest, HttpResponse, ReqwestHttpClient,
    StaticHttpClient, StaticRoute,
};

// Orchestration
pub use orchestrator::{FetchOrchestrator, OrchestratorConfig};
pub use registry::{Admission, AdmissionPlan, SkipReason, SourceDescriptor, SourceEntry, SourceRegistry};

// Snapshot document
pub use snapshot::{
    DataQuality, FieldProvenance, FusedSnapshot, MarketOverview, RegionSnapshot, SnapshotData,
    SourceContribution, SIMULATED_DATA_SOURCE,
};

// Source identifiers
pub use source::ProviderKind;
