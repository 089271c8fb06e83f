//! Observability metrics for the publisher pipeline
//!
//! Metrics go through the `metrics` facade. Without an installed exporter
//! every macro call is a no-op, so library code records unconditionally and
//! only the binary decides whether to expose a Prometheus scrape endpoint.
//!
//! ## Recorded series
//!
//! - `lims_http_requests_total{endpoint,status}`
//! - `lims_http_request_duration_seconds{endpoint}`
//! - `lims_http_retries_total{endpoint}`
//! - `requests_published_total`, `request_failures_total`,
//!   `manifest_failures_total`, `chunks_processed_total`

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::lims::LimsEndpoint;

static METRICS_INITIALIZED: OnceCell<SocketAddr> = OnceCell::new();

static CORRELATION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Metrics exporter errors
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Prometheus exporter could not bind or install
    #[error("failed to install Prometheus exporter on {addr}: {reason}")]
    InstallFailed {
        /// Requested listen address
        addr: SocketAddr,
        /// Underlying cause
        reason: String,
    },
}

/// Install the Prometheus exporter and describe all series.
///
/// Must be called from within a Tokio runtime. Idempotent: later calls are
/// ignored.
pub fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    if let Some(existing) = METRICS_INITIALIZED.get() {
        debug!(%existing, "Metrics already initialized, skipping");
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError::InstallFailed {
            addr,
            reason: e.to_string(),
        })?;

    describe_counter!(
        "lims_http_requests_total",
        Unit::Count,
        "HTTP requests sent to the LIMS, by endpoint and outcome"
    );
    describe_histogram!(
        "lims_http_request_duration_seconds",
        Unit::Seconds,
        "LIMS request duration"
    );
    describe_counter!(
        "lims_http_retries_total",
        Unit::Count,
        "LIMS request retries"
    );
    describe_counter!(
        "requests_published_total",
        Unit::Count,
        "Requests handed to the publisher"
    );
    describe_counter!(
        "request_failures_total",
        Unit::Count,
        "Requests whose sample listing failed"
    );
    describe_counter!(
        "manifest_failures_total",
        Unit::Count,
        "Samples whose manifest could not be resolved"
    );
    describe_counter!(
        "chunks_processed_total",
        Unit::Count,
        "Request chunks fully settled"
    );

    let _ = METRICS_INITIALIZED.set(addr);
    info!(%addr, "Metrics exporter listening");
    Ok(())
}

/// Whether an exporter has been installed
pub fn is_initialized() -> bool {
    METRICS_INITIALIZED.get().is_some()
}

/// Next correlation id for request tracing
pub fn generate_correlation_id() -> String {
    let id = CORRELATION_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("lims-{id:08x}")
}

/// Timing and outcome of one LIMS HTTP attempt
pub struct HttpRequestMetrics {
    endpoint: LimsEndpoint,
    start_time: Instant,
    correlation_id: String,
    attempt: u32,
}

impl HttpRequestMetrics {
    /// Start timing an attempt (1-based)
    pub fn start(endpoint: LimsEndpoint, attempt: u32) -> Self {
        let correlation_id = generate_correlation_id();
        debug!(
            correlation_id = %correlation_id,
            endpoint = %endpoint,
            attempt,
            "Sending LIMS request"
        );
        Self {
            endpoint,
            start_time: Instant::now(),
            correlation_id,
            attempt,
        }
    }

    /// Record a response with `status_code`
    pub fn record_complete(&self, status_code: u16) {
        let duration = self.start_time.elapsed();
        self.record(status_code.to_string(), duration);

        debug!(
            correlation_id = %self.correlation_id,
            endpoint = %self.endpoint,
            status = status_code,
            duration_ms = duration.as_millis() as u64,
            "LIMS request completed"
        );
    }

    /// Record a transport failure (no status)
    pub fn record_network_error(&self) {
        let duration = self.start_time.elapsed();
        self.record("network_error".to_string(), duration);

        warn!(
            correlation_id = %self.correlation_id,
            endpoint = %self.endpoint,
            attempt = self.attempt,
            duration_ms = duration.as_millis() as u64,
            "LIMS request failed before a response arrived"
        );
    }

    fn record(&self, status: String, duration: Duration) {
        counter!(
            "lims_http_requests_total",
            "endpoint" => self.endpoint.label(),
            "status" => status,
        )
        .increment(1);
        histogram!(
            "lims_http_request_duration_seconds",
            "endpoint" => self.endpoint.label(),
        )
        .record(duration.as_secs_f64());
    }
}

/// Record a retry about to wait `backoff`
pub fn record_retry(endpoint: LimsEndpoint, backoff: Duration) {
    counter!("lims_http_retries_total", "endpoint" => endpoint.label()).increment(1);
    debug!(
        endpoint = %endpoint,
        backoff_ms = backoff.as_millis() as u64,
        "Retry scheduled"
    );
}

/// Record a request handed to the publisher
pub fn record_request_published(manifests: usize) {
    counter!("requests_published_total").increment(1);
    debug!(manifests, "Request published");
}

/// Record a request whose sample listing failed
pub fn record_request_failure() {
    counter!("request_failures_total").increment(1);
}

/// Record a sample whose manifest could not be resolved
pub fn record_manifest_failure() {
    counter!("manifest_failures_total").increment(1);
}

/// Record a settled chunk
pub fn record_chunk_processed() {
    counter!("chunks_processed_total").increment(1);
}
