//! # LIMS Request Publisher Library
//!
//! Retrieves laboratory requests delivered within a date range from a LIMS REST
//! service, resolves every sample manifest of every request, and hands the
//! aggregated results to a downstream publisher.
//!
//! ## Quick Start
//!
//! ```no_run
//! use lims_publisher::aggregator::{PipelineConfig, RequestAggregator};
//! use lims_publisher::date_range;
//! use lims_publisher::lims::{LimsConfig, LimsRestClient};
//! use lims_publisher::publisher::NdjsonPublisher;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let interval = date_range::resolve("2024/01/01", Some("2024/01/31"))?;
//!
//! let config = LimsConfig::new("https://lims.example.org", "user", "secret");
//! let source = Arc::new(LimsRestClient::new(&config)?);
//!
//! let aggregator = RequestAggregator::new(source, PipelineConfig::default());
//! let publisher = NdjsonPublisher::stdout();
//! let summary = aggregator.run(&interval, &publisher).await?;
//!
//! println!("{}", summary.ledger.render());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`date_range`] - Start/end date validation (`YYYY/MM/DD`)
//! - [`lims`] - LIMS REST client: request ids, sample ids, sample manifests
//! - [`aggregator`] - Chunked two-stage fan-out with bounded pools
//! - [`ledger`] - Failed sample bookkeeping and the end-of-run report
//! - [`publisher`] - Downstream hand-off of completed requests
//! - [`cli`] - Command line surface and settings loading

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Chunked request aggregation
pub mod aggregator;

/// CLI command implementation
pub mod cli;

/// Date range parsing and validation
pub mod date_range;

/// Failed sample bookkeeping
pub mod ledger;

/// LIMS REST client
pub mod lims;

/// Observability metrics
pub mod metrics;

/// Downstream publishing
pub mod publisher;

/// Process-wide cancellation signal
pub mod shutdown;

pub use date_range::TimeInterval;

/// Field naming a sample's identifier in LIMS sample and manifest records
pub const SAMPLE_ID_FIELD: &str = "igoSampleId";

/// Identifier of a laboratory request (e.g. "09641_B")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Wrap a raw identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Identifier of a sample, globally addressable for manifest lookup
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleId(String);

impl SampleId {
    /// Wrap a raw identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SampleId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Manifest record describing one sample.
///
/// The payload is passed through untouched; only the sample id is ever read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest(Map<String, Value>);

impl Manifest {
    /// Wrap a JSON object
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Sample id recorded in the manifest, if present
    pub fn sample_id(&self) -> Option<&str> {
        self.0.get(SAMPLE_ID_FIELD).and_then(Value::as_str)
    }

    /// Look up a raw field
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }
}

/// Sample manifest resolution failure.
///
/// Never fatal: the sample is dropped from its request and recorded in the
/// error ledger.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("manifest fetch failed for sample {sample_id}: {reason}")]
pub struct ManifestFetchFailure {
    /// Sample whose manifest could not be resolved
    pub sample_id: SampleId,
    /// Human readable cause
    pub reason: String,
}

impl ManifestFetchFailure {
    /// Build a failure for `sample_id`
    pub fn new(sample_id: SampleId, reason: impl Into<String>) -> Self {
        Self {
            sample_id,
            reason: reason.into(),
        }
    }
}

/// All successfully resolved manifests of one request, in sample-list order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestResult {
    /// Request the manifests belong to
    #[serde(rename = "requestId")]
    pub request_id: RequestId,
    /// Manifests of resolved samples only
    #[serde(rename = "samples")]
    pub manifests: Vec<Manifest>,
}

impl RequestResult {
    /// Create a result for `request_id`
    pub fn new(request_id: RequestId, manifests: Vec<Manifest>) -> Self {
        Self {
            request_id,
            manifests,
        }
    }

    /// Number of manifests carried
    pub fn len(&self) -> usize {
        self.manifests.len()
    }

    /// Whether no sample of the request resolved
    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }
}
