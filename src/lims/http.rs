//! LIMS HTTP client
//!
//! Every call carries basic auth credentials and a JSON content type. Network
//! errors and 5xx responses are retried with capped exponential backoff; 4xx
//! responses are not. Whatever is left after retries surfaces as
//! [`LimsError::SourceUnavailable`].

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::config::{LimsConfig, LimsEndpoint};
use super::{LimsError, LimsResult};
use crate::metrics::{self, HttpRequestMetrics};
use crate::shutdown::{self, SharedShutdown};

const APPLICATION_JSON: &str = "application/json";

/// Authenticated HTTP access to the LIMS REST service
pub struct LimsHttpClient {
    client: Client,
    config: LimsConfig,
    shutdown: Option<SharedShutdown>,
}

impl LimsHttpClient {
    /// Build a client from validated settings.
    ///
    /// # Errors
    /// Returns [`LimsError::Configuration`] if the settings are invalid or the
    /// TLS backend cannot be initialised.
    pub fn new(config: LimsConfig) -> LimsResult<Self> {
        config.validate()?;

        if config.accept_invalid_certs {
            warn!(
                base_url = %config.base_url,
                "TLS certificate verification disabled for LIMS connections"
            );
        }

        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| LimsError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            shutdown: shutdown::global_shutdown(),
        })
    }

    /// Skip retries once `shutdown` is raised
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Settings this client was built from
    pub fn config(&self) -> &LimsConfig {
        &self.config
    }

    /// Retries after the first attempt
    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// Sleep for `backoff`. Returns false when cancellation cut it short.
    async fn wait_backoff(&self, backoff: Duration) -> bool {
        match &self.shutdown {
            Some(signal) => tokio::select! {
                _ = tokio::time::sleep(backoff) => true,
                _ = signal.raised() => false,
            },
            None => {
                tokio::time::sleep(backoff).await;
                true
            }
        }
    }

    /// GET `endpoint` with `key` appended and decode the JSON body
    ///
    /// # Errors
    /// - [`LimsError::SourceUnavailable`] on transport errors, timeouts, and
    ///   non-success statuses once retries are exhausted
    /// - [`LimsError::MalformedResponse`] if the body is not JSON
    pub async fn get_json(&self, endpoint: LimsEndpoint, key: &str) -> LimsResult<Value> {
        let url = self.config.url(endpoint, key);
        let max_retries = self.config.max_retries;
        let mut last_error = None;

        for attempt in 0..=max_retries {
            if attempt > 0 {
                if shutdown::is_raised(self.shutdown.as_ref()) {
                    debug!(endpoint = %endpoint, "Cancellation raised, not retrying");
                    break;
                }
                let backoff = self.config.backoff(attempt - 1);
                metrics::record_retry(endpoint, backoff);
                if !self.wait_backoff(backoff).await {
                    debug!(endpoint = %endpoint, ?backoff, "Cancellation raised during backoff");
                    break;
                }
            }

            let request_metrics = HttpRequestMetrics::start(endpoint, attempt + 1);
            let response = match self
                .client
                .get(&url)
                .basic_auth(&self.config.username, Some(&self.config.password))
                .header(CONTENT_TYPE, APPLICATION_JSON)
                .header(ACCEPT, APPLICATION_JSON)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    request_metrics.record_network_error();
                    let reason = if e.is_timeout() {
                        format!("request to {url} timed out")
                    } else {
                        format!("request to {url} failed: {e}")
                    };
                    warn!(
                        endpoint = %endpoint,
                        attempt = attempt + 1,
                        max_attempts = max_retries + 1,
                        "{}",
                        reason
                    );
                    last_error = Some(LimsError::SourceUnavailable(reason));
                    continue;
                }
            };

            let status = response.status();
            request_metrics.record_complete(status.as_u16());

            if status.is_server_error() {
                warn!(
                    endpoint = %endpoint,
                    %status,
                    attempt = attempt + 1,
                    max_attempts = max_retries + 1,
                    "LIMS server error"
                );
                last_error = Some(LimsError::SourceUnavailable(format!(
                    "server error {status} from {url}"
                )));
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(LimsError::SourceUnavailable(format!(
                    "status {status} from {url}: {}",
                    truncate(&body, 200)
                )));
            }

            return response.json::<Value>().await.map_err(|e| {
                if e.is_timeout() {
                    LimsError::SourceUnavailable(format!("reading body from {url} timed out"))
                } else {
                    LimsError::MalformedResponse(format!("invalid JSON from {url}: {e}"))
                }
            });
        }

        Err(last_error.unwrap_or_else(|| {
            LimsError::SourceUnavailable(format!("no attempt made for {url}"))
        }))
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
