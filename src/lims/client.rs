//! LimsRest implementation of [`LimsSource`]

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::config::{LimsConfig, LimsEndpoint};
use super::http::LimsHttpClient;
use super::parser::LimsParser;
use super::{LimsResult, LimsSource, SampleListing};
use crate::shutdown::SharedShutdown;
use crate::{Manifest, ManifestFetchFailure, RequestId, SampleId, TimeInterval};

/// LIMS source backed by the LimsRest HTTP API
pub struct LimsRestClient {
    http: LimsHttpClient,
}

impl LimsRestClient {
    /// Create a client for `config`.
    ///
    /// # Errors
    /// Returns [`super::LimsError::Configuration`] for unusable settings.
    pub fn new(config: &LimsConfig) -> LimsResult<Self> {
        Ok(Self {
            http: LimsHttpClient::new(config.clone())?,
        })
    }

    /// Skip retries once `shutdown` is raised
    pub fn with_shutdown(self, shutdown: SharedShutdown) -> Self {
        Self {
            http: self.http.with_shutdown(shutdown),
        }
    }

    /// Base URL requests go to
    pub fn base_url(&self) -> &str {
        &self.http.config().base_url
    }
}

#[async_trait]
impl LimsSource for LimsRestClient {
    async fn request_ids(&self, interval: &TimeInterval) -> LimsResult<Vec<RequestId>> {
        let start_ms = interval.start_millis();
        debug!(start_ms, %interval, "Fetching request deliveries");

        let body = self
            .http
            .get_json(LimsEndpoint::RequestDeliveries, &start_ms.to_string())
            .await?;
        let deliveries = LimsParser::parse_deliveries(body)?;
        let delivered = deliveries.len();
        let request_ids = LimsParser::select_request_ids(deliveries, interval);

        info!(
            delivered,
            selected = request_ids.len(),
            %interval,
            "Fetched request ids"
        );
        Ok(request_ids)
    }

    async fn sample_ids(&self, request_id: &RequestId) -> LimsResult<SampleListing> {
        let body = self
            .http
            .get_json(LimsEndpoint::RequestSamples, request_id.as_str())
            .await?;
        let listing = LimsParser::parse_sample_ids(&body)?;

        debug!(
            request_id = %request_id,
            samples = listing.sample_ids.len(),
            unidentified = listing.unidentified.len(),
            "Fetched sample ids"
        );
        Ok(listing)
    }

    async fn sample_manifest(&self, sample_id: &SampleId) -> Result<Manifest, ManifestFetchFailure> {
        self.http
            .get_json(LimsEndpoint::SampleManifest, sample_id.as_str())
            .await
            .and_then(LimsParser::parse_manifest)
            .map_err(|e| {
                warn!(sample_id = %sample_id, error = %e, "Sample manifest could not be fetched");
                ManifestFetchFailure::new(sample_id.clone(), e.to_string())
            })
    }
}
