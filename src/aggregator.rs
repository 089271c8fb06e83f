//! Chunked request aggregation
//!
//! A run walks through `Idle → FetchingRequestIds → ProcessingChunks →
//! Draining → Done`, or ends in `Failed` when the request listing or the
//! publisher fails.
//!
//! # Concurrency
//!
//! Request ids are split into fixed-size chunks processed one after another.
//! Within a chunk up to `processing_pool_width` requests run at once; each
//! lists its samples and then fetches every manifest through a fetch pool of
//! `fetch_pool_width` permits shared by the whole run. A chunk's results are
//! published, in request order, only once every request of the chunk has
//! settled, and the next chunk starts after that.
//!
//! # Failures
//!
//! - request listing fails: the run fails
//! - sample listing fails: the request is recorded as failed, run continues
//! - manifest fetch fails: the sample is dropped from its request and
//!   recorded, request and run continue
//! - a listed sample has no id: it is recorded under a placeholder and never
//!   fetched

use futures_util::future::join_all;
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::ledger::{ErrorLedger, LedgerSnapshot};
use crate::lims::{LimsError, LimsSource};
use crate::metrics;
use crate::publisher::{PublishError, Publisher};
use crate::shutdown::{self, SharedShutdown};
use crate::{RequestId, RequestResult, SampleId, TimeInterval};

/// Requests per chunk
pub const DEFAULT_CHUNK_SIZE: usize = 10;
/// Requests processed concurrently within a chunk
pub const DEFAULT_PROCESSING_POOL_WIDTH: usize = 10;
/// Manifest fetches in flight across the run
pub const DEFAULT_FETCH_POOL_WIDTH: usize = 5;

/// Chunking and pool sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Requests per chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Concurrent request-level tasks
    #[serde(default = "default_processing_pool_width")]
    pub processing_pool_width: usize,
    /// Concurrent manifest fetches
    #[serde(default = "default_fetch_pool_width")]
    pub fetch_pool_width: usize,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_processing_pool_width() -> usize {
    DEFAULT_PROCESSING_POOL_WIDTH
}

fn default_fetch_pool_width() -> usize {
    DEFAULT_FETCH_POOL_WIDTH
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            processing_pool_width: DEFAULT_PROCESSING_POOL_WIDTH,
            fetch_pool_width: DEFAULT_FETCH_POOL_WIDTH,
        }
    }
}

impl PipelineConfig {
    /// Check every size is at least 1
    pub fn validate(&self) -> Result<(), AggregatorError> {
        for (name, value) in [
            ("chunk_size", self.chunk_size),
            ("processing_pool_width", self.processing_pool_width),
            ("fetch_pool_width", self.fetch_pool_width),
        ] {
            if value == 0 {
                return Err(AggregatorError::InvalidConfig(format!(
                    "{name} must be at least 1"
                )));
            }
        }
        Ok(())
    }
}

/// Aggregator errors. Each one ends the run.
#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    /// Request ids could not be listed
    #[error("failed to fetch request ids: {0}")]
    RequestIds(#[source] LimsError),

    /// Publisher rejected a result or failed to flush
    #[error("publisher failed: {0}")]
    Publish(#[from] PublishError),

    /// Pipeline sizing is unusable
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),
}

/// Run lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Not started
    Idle,
    /// Listing request ids
    FetchingRequestIds,
    /// Working through chunks
    ProcessingChunks,
    /// Collecting the failure ledger
    Draining,
    /// Finished, possibly early on cancellation
    Done,
    /// Aborted by a fatal error
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::FetchingRequestIds => "fetching_request_ids",
            Self::ProcessingChunks => "processing_chunks",
            Self::Draining => "draining",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Outcome of a completed run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Request ids selected for the interval
    pub requests_total: usize,
    /// Results handed to the publisher
    pub requests_published: usize,
    /// Requests whose sample listing failed
    pub requests_failed: usize,
    /// Samples whose manifest could not be resolved
    pub samples_failed: usize,
    /// Chunks fully settled
    pub chunks_processed: usize,
    /// Chunks the request ids were split into
    pub chunks_total: usize,
    /// Whether cancellation stopped the run before the last chunk
    pub cancelled: bool,
    /// Failures recorded during the run
    pub ledger: LedgerSnapshot,
}

impl RunSummary {
    /// Whether every request and sample resolved
    pub fn is_clean(&self) -> bool {
        self.ledger.is_empty() && !self.cancelled
    }
}

/// Drives the request → samples → manifests fan-out
pub struct RequestAggregator {
    source: Arc<dyn LimsSource>,
    config: PipelineConfig,
    shutdown: Option<SharedShutdown>,
    state: Mutex<RunState>,
}

impl RequestAggregator {
    /// Create an aggregator over `source`
    pub fn new(source: Arc<dyn LimsSource>, config: PipelineConfig) -> Self {
        Self {
            source,
            config,
            shutdown: shutdown::global_shutdown(),
            state: Mutex::new(RunState::Idle),
        }
    }

    /// Stop starting new chunks once `shutdown` is raised
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Pipeline sizing in use
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Current lifecycle state
    pub fn state(&self) -> RunState {
        *self.state.lock()
    }

    fn transition(&self, next: RunState) {
        let mut state = self.state.lock();
        debug!(from = %*state, to = %next, "Run state transition");
        *state = next;
    }

    /// Run the pipeline for `interval`, publishing each chunk as it settles.
    ///
    /// # Errors
    /// - [`AggregatorError::RequestIds`] if the request listing fails
    /// - [`AggregatorError::Publish`] if the publisher fails
    /// - [`AggregatorError::InvalidConfig`] for zero-sized chunks or pools
    pub async fn run<P>(
        &self,
        interval: &TimeInterval,
        publisher: &P,
    ) -> Result<RunSummary, AggregatorError>
    where
        P: Publisher + ?Sized,
    {
        self.config.validate()?;
        let span = info_span!("aggregate_run", %interval);
        let result = self.run_inner(interval, publisher).instrument(span).await;
        if let Err(e) = &result {
            self.transition(RunState::Failed);
            error!(error = %e, "Run failed");
        }
        result
    }

    async fn run_inner<P>(
        &self,
        interval: &TimeInterval,
        publisher: &P,
    ) -> Result<RunSummary, AggregatorError>
    where
        P: Publisher + ?Sized,
    {
        self.transition(RunState::FetchingRequestIds);
        let request_ids = self
            .source
            .request_ids(interval)
            .await
            .map_err(AggregatorError::RequestIds)?;

        self.transition(RunState::ProcessingChunks);
        let chunk_size = self.config.chunk_size;
        let chunks_total = request_ids.len().div_ceil(chunk_size);
        info!(
            requests = request_ids.len(),
            chunks = chunks_total,
            chunk_size,
            processing_pool_width = self.config.processing_pool_width,
            fetch_pool_width = self.config.fetch_pool_width,
            "Processing requests"
        );

        let ledger = ErrorLedger::new();
        let fetch_pool = Semaphore::new(self.config.fetch_pool_width);
        let mut requests_published = 0;
        let mut chunks_processed = 0;
        let mut cancelled = false;

        for (index, chunk) in request_ids.chunks(chunk_size).enumerate() {
            if shutdown::is_raised(self.shutdown.as_ref()) {
                warn!(
                    chunks_processed,
                    chunks_total, "Cancellation raised, not starting further chunks"
                );
                cancelled = true;
                break;
            }

            let results = self
                .process_chunk(chunk, &ledger, &fetch_pool)
                .instrument(info_span!("chunk", index, size = chunk.len()))
                .await;

            for result in results.into_iter().flatten() {
                let manifests = result.len();
                publisher.publish(result).await?;
                metrics::record_request_published(manifests);
                requests_published += 1;
            }
            publisher.flush().await?;

            chunks_processed += 1;
            metrics::record_chunk_processed();
            debug!(index, chunks_total, "Chunk settled");
        }

        self.transition(RunState::Draining);
        let snapshot = ledger.snapshot();
        let summary = RunSummary {
            requests_total: request_ids.len(),
            requests_published,
            requests_failed: snapshot.request_failures().len(),
            samples_failed: snapshot.sample_failure_count(),
            chunks_processed,
            chunks_total,
            cancelled,
            ledger: snapshot,
        };

        self.transition(RunState::Done);
        info!(
            requests_total = summary.requests_total,
            requests_published = summary.requests_published,
            requests_failed = summary.requests_failed,
            samples_failed = summary.samples_failed,
            cancelled = summary.cancelled,
            "Run complete"
        );
        Ok(summary)
    }

    /// Process one chunk; results come back in chunk order.
    ///
    /// Requests settle in any order and a free worker picks up the next
    /// request at once, however slow the others are.
    async fn process_chunk(
        &self,
        chunk: &[RequestId],
        ledger: &ErrorLedger,
        fetch_pool: &Semaphore,
    ) -> Vec<Option<RequestResult>> {
        let mut settled: Vec<(usize, Option<RequestResult>)> =
            stream::iter(chunk.iter().enumerate())
                .map(|(index, request_id)| async move {
                    (index, self.process_request(request_id, ledger, fetch_pool).await)
                })
                .buffer_unordered(self.config.processing_pool_width)
                .collect()
                .await;

        settled.sort_unstable_by_key(|(index, _)| *index);
        settled.into_iter().map(|(_, result)| result).collect()
    }

    /// List a request's samples and resolve every manifest.
    ///
    /// Returns `None` when the sample listing fails.
    async fn process_request(
        &self,
        request_id: &RequestId,
        ledger: &ErrorLedger,
        fetch_pool: &Semaphore,
    ) -> Option<RequestResult> {
        let listing = match self.source.sample_ids(request_id).await {
            Ok(listing) => listing,
            Err(e) => {
                warn!(request_id = %request_id, error = %e, "Sample listing failed");
                ledger.record_request_failure(request_id, e.to_string());
                metrics::record_request_failure();
                return None;
            }
        };

        let mut failed = 0usize;
        for placeholder in listing.placeholders() {
            warn!(request_id = %request_id, sample_id = %placeholder, "Recording unidentified sample");
            ledger.record(request_id, placeholder);
            metrics::record_manifest_failure();
            failed += 1;
        }

        let outcomes = join_all(
            listing
                .sample_ids
                .iter()
                .map(|sample_id| self.fetch_manifest(sample_id, fetch_pool)),
        )
        .await;

        let mut manifests = Vec::with_capacity(outcomes.len());
        for (sample_id, outcome) in listing.sample_ids.into_iter().zip(outcomes) {
            match outcome {
                Ok(manifest) => manifests.push(manifest),
                Err(failure) => {
                    debug!(sample_id = %sample_id, reason = %failure.reason, "Recording failed sample");
                    ledger.record(request_id, sample_id);
                    metrics::record_manifest_failure();
                    failed += 1;
                }
            }
        }

        info!(
            request_id = %request_id,
            resolved = manifests.len(),
            failed,
            "Request settled"
        );
        Some(RequestResult::new(request_id.clone(), manifests))
    }

    async fn fetch_manifest(
        &self,
        sample_id: &SampleId,
        fetch_pool: &Semaphore,
    ) -> Result<crate::Manifest, crate::ManifestFetchFailure> {
        // The pool is never closed, so acquisition only waits.
        let _permit = fetch_pool.acquire().await.ok();
        self.source.sample_manifest(sample_id).await
    }
}
