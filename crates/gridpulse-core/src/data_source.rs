//! Source adapter contract and per-fetch result types.
//!
//! Every provider adapter turns one outbound request into either an
//! [`IntermediateRecord`] or a classified [`FetchError`]. Adapters never retry;
//! retry policy is owned by the circuit breaker so that breaker accounting sees
//! exactly one outcome per attempted fetch.
//!
//! | Error kind | Code | Meaning |
//! |------------|------|---------|
//! | [`FetchErrorKind::Transport`] | `source.transport` | connection or I/O failure |
//! | [`FetchErrorKind::Timeout`] | `source.timeout` | per-source or global deadline exceeded |
//! | [`FetchErrorKind::HttpStatus`] | `source.http_status` | non-2xx response |
//! | [`FetchErrorKind::Parse`] | `source.parse` | payload shape not understood |

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::http_client::HttpError;
use crate::{MetricSet, ProviderKind, UtcDateTime};

/// Fetch failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    Transport,
    Timeout,
    HttpStatus,
    Parse,
}

impl FetchErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::Timeout => "timeout",
            Self::HttpStatus => "http_status",
            Self::Parse => "parse",
        }
    }
}

impl Display for FetchErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured adapter error recorded by the breaker and the reliability window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    kind: FetchErrorKind,
    message: String,
    status: Option<u16>,
}

impl FetchError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Transport,
            message: message.into(),
            status: None,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Timeout,
            message: message.into(),
            status: None,
        }
    }

    pub fn http_status(status: u16) -> Self {
        Self {
            kind: FetchErrorKind::HttpStatus,
            message: format!("upstream returned status {status}"),
            status: Some(status),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Parse,
            message: message.into(),
            status: None,
        }
    }

    pub const fn kind(&self) -> FetchErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn status(&self) -> Option<u16> {
        self.status
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            FetchErrorKind::Transport => "source.transport",
            FetchErrorKind::Timeout => "source.timeout",
            FetchErrorKind::HttpStatus => "source.http_status",
            FetchErrorKind::Parse => "source.parse",
        }
    }
}

impl From<HttpError> for FetchError {
    fn from(error: HttpError) -> Self {
        if error.is_timeout() {
            Self::timeout(error.message())
        } else {
            Self::transport(error.message())
        }
    }
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for FetchError {}

/// Provider-normalized metrics from one successful fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct IntermediateRecord {
    pub source: String,
    /// When this engine received the payload.
    pub fetched_at: UtcDateTime,
    /// Provider's own observation/settlement time, when the payload carries one.
    pub observed_at: Option<UtcDateTime>,
    /// Share of expected fields that parsed cleanly, in `[0, 1]`.
    pub parse_confidence: f64,
    pub metrics: MetricSet,
}

impl IntermediateRecord {
    pub fn new(source: impl Into<String>, fetched_at: UtcDateTime, metrics: MetricSet) -> Self {
        Self {
            source: source.into(),
            fetched_at,
            observed_at: None,
            parse_confidence: 1.0,
            metrics,
        }
    }

    pub fn with_observed_at(mut self, observed_at: Option<UtcDateTime>) -> Self {
        self.observed_at = observed_at;
        self
    }

    pub fn with_parse_confidence(mut self, confidence: f64) -> Self {
        self.parse_confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }
}

/// Outcome of one adapter invocation within a cycle.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub source: String,
    pub priority: u32,
    pub elapsed: Duration,
    pub outcome: Result<IntermediateRecord, FetchError>,
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn error_kind(&self) -> Option<FetchErrorKind> {
        self.outcome.as_ref().err().map(FetchError::kind)
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed.as_millis().min(u128::from(u64::MAX)) as u64
    }
}

/// Boxed fetch future returned by [`SourceAdapter::fetch`].
pub type FetchFuture<'a> =
    Pin<Box<dyn Future<Output = Result<IntermediateRecord, FetchError>> + Send + 'a>>;

/// Source adapter contract.
///
/// Implementations issue exactly one outbound request per call and must be cancel-safe:
/// the orchestrator drops the future when the deadline passes.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` as they are shared across fetch tasks.
pub trait SourceAdapter: Send + Sync {
    /// Configured source name stamped on produced records.
    fn name(&self) -> &str;

    /// Payload family this adapter parses.
    fn kind(&self) -> ProviderKind;

    /// Fetches and parses one payload, giving up after `timeout`.
    fn fetch(&self, timeout: Duration) -> FetchFuture<'_>;
}
