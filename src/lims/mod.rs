//! LIMS REST client
//!
//! The LIMS exposes three read operations this crate consumes:
//!
//! - requests delivered since a timestamp ([`LimsSource::request_ids`])
//! - samples of a request ([`LimsSource::sample_ids`])
//! - the manifest of a sample ([`LimsSource::sample_manifest`])
//!
//! [`LimsRestClient`] implements them over HTTP; tests substitute in-memory
//! sources through the same trait.

use crate::{Manifest, ManifestFetchFailure, RequestId, SampleId, TimeInterval, SAMPLE_ID_FIELD};
use async_trait::async_trait;

pub mod client;
pub mod config;
pub mod http;
pub mod parser;

pub use client::LimsRestClient;
pub use config::{LimsConfig, LimsEndpoint};
pub use http::LimsHttpClient;
pub use parser::{DeliveryRecord, LimsParser};

/// LIMS access errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LimsError {
    /// Transport failure, timeout, or non-success status
    #[error("LIMS unavailable: {0}")]
    SourceUnavailable(String),

    /// Response body could not be interpreted
    #[error("malformed LIMS response: {0}")]
    MalformedResponse(String),

    /// Client could not be constructed from the given settings
    #[error("LIMS client configuration error: {0}")]
    Configuration(String),
}

/// Result type for LIMS operations
pub type LimsResult<T> = Result<T, LimsError>;

/// Samples of one request as listed by the LIMS
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleListing {
    /// Identified samples, in source order
    pub sample_ids: Vec<SampleId>,
    /// Positions of listed entries that carry no sample id
    pub unidentified: Vec<usize>,
}

impl SampleListing {
    pub fn new(sample_ids: Vec<SampleId>) -> Self {
        Self {
            sample_ids,
            unidentified: Vec::new(),
        }
    }

    /// Listed entries, identified or not
    pub fn len(&self) -> usize {
        self.sample_ids.len() + self.unidentified.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Report entries standing in for the unidentified samples
    pub fn placeholders(&self) -> impl Iterator<Item = SampleId> + '_ {
        self.unidentified
            .iter()
            .map(|index| SampleId::new(format!("<missing {SAMPLE_ID_FIELD} #{index}>")))
    }
}

impl From<Vec<SampleId>> for SampleListing {
    fn from(sample_ids: Vec<SampleId>) -> Self {
        Self::new(sample_ids)
    }
}

/// Read access to the laboratory information system
#[async_trait]
pub trait LimsSource: Send + Sync {
    /// Request ids delivered within `interval`, in source order.
    ///
    /// # Errors
    /// Any failure is fatal to a run: without request ids nothing can proceed.
    async fn request_ids(&self, interval: &TimeInterval) -> LimsResult<Vec<RequestId>>;

    /// Sample ids of one request, in source order.
    ///
    /// Entries the LIMS lists without an id are reported by position.
    ///
    /// # Errors
    /// A failure covers the whole request; no partial list is returned.
    async fn sample_ids(&self, request_id: &RequestId) -> LimsResult<SampleListing>;

    /// Manifest of one sample.
    ///
    /// Never aborts the caller: every error is folded into a
    /// [`ManifestFetchFailure`].
    async fn sample_manifest(&self, sample_id: &SampleId) -> Result<Manifest, ManifestFetchFailure>;
}
