//! LIMS connection settings
//!
//! Endpoint paths are prefixes: the request id, sample id, or start timestamp
//! is appended verbatim, matching how the LimsRest service routes its query
//! parameters.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::{LimsError, LimsResult};

/// Default path for "requests delivered since timestamp"
pub const DEFAULT_REQUEST_DELIVERIES_ENDPOINT: &str = "/LimsRest/api/getDeliveries?timestamp=";
/// Default path for "samples of request"
pub const DEFAULT_REQUEST_SAMPLES_ENDPOINT: &str = "/LimsRest/api/getRequestSamples?request=";
/// Default path for "manifest of sample"
pub const DEFAULT_SAMPLE_MANIFEST_ENDPOINT: &str = "/LimsRest/api/getSampleManifest?igoSampleId=";

/// Time to establish a TCP/TLS connection
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
/// Overall time for one request, body included
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
/// Retries after the first attempt on network errors and 5xx
pub const DEFAULT_MAX_RETRIES: u32 = 2;
/// First retry delay
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 500;
/// Retry delay cap
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 5_000;

/// The three LIMS read operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimsEndpoint {
    /// Requests delivered since a timestamp
    RequestDeliveries,
    /// Samples belonging to a request
    RequestSamples,
    /// Manifest of a single sample
    SampleManifest,
}

impl LimsEndpoint {
    /// Stable label used in logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            Self::RequestDeliveries => "request_deliveries",
            Self::RequestSamples => "request_samples",
            Self::SampleManifest => "sample_manifest",
        }
    }
}

impl fmt::Display for LimsEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Connection settings for the LIMS REST service.
///
/// Loaded from the `[lims]` table of the settings file; see
/// [`crate::cli::settings`].
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimsConfig {
    /// Scheme and host, e.g. `https://lims.example.org`
    #[serde(default)]
    pub base_url: String,
    /// Basic auth user
    #[serde(default)]
    pub username: String,
    /// Basic auth password
    #[serde(default)]
    pub password: String,
    /// Path prefix for request deliveries
    #[serde(default = "default_request_deliveries_endpoint")]
    pub request_deliveries_endpoint: String,
    /// Path prefix for request samples
    #[serde(default = "default_request_samples_endpoint")]
    pub request_samples_endpoint: String,
    /// Path prefix for sample manifests
    #[serde(default = "default_sample_manifest_endpoint")]
    pub sample_manifest_endpoint: String,
    /// Skip TLS certificate and hostname verification. Opt-in only.
    #[serde(default)]
    pub accept_invalid_certs: bool,
    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Overall request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First retry delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Retry delay cap in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_request_deliveries_endpoint() -> String {
    DEFAULT_REQUEST_DELIVERIES_ENDPOINT.to_string()
}

fn default_request_samples_endpoint() -> String {
    DEFAULT_REQUEST_SAMPLES_ENDPOINT.to_string()
}

fn default_sample_manifest_endpoint() -> String {
    DEFAULT_SAMPLE_MANIFEST_ENDPOINT.to_string()
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_initial_backoff_ms() -> u64 {
    DEFAULT_INITIAL_BACKOFF_MS
}

fn default_max_backoff_ms() -> u64 {
    DEFAULT_MAX_BACKOFF_MS
}

impl Default for LimsConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            username: String::new(),
            password: String::new(),
            request_deliveries_endpoint: default_request_deliveries_endpoint(),
            request_samples_endpoint: default_request_samples_endpoint(),
            sample_manifest_endpoint: default_sample_manifest_endpoint(),
            accept_invalid_certs: false,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
        }
    }
}

// Keeps the password out of logs.
impl fmt::Debug for LimsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LimsConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"***")
            .field("request_deliveries_endpoint", &self.request_deliveries_endpoint)
            .field("request_samples_endpoint", &self.request_samples_endpoint)
            .field("sample_manifest_endpoint", &self.sample_manifest_endpoint)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl LimsConfig {
    /// Settings with default endpoints and timeouts
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            username: username.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    /// Path prefix configured for `endpoint`
    pub fn endpoint_path(&self, endpoint: LimsEndpoint) -> &str {
        match endpoint {
            LimsEndpoint::RequestDeliveries => &self.request_deliveries_endpoint,
            LimsEndpoint::RequestSamples => &self.request_samples_endpoint,
            LimsEndpoint::SampleManifest => &self.sample_manifest_endpoint,
        }
    }

    /// Full URL for `endpoint` with `key` appended
    pub fn url(&self, endpoint: LimsEndpoint, key: &str) -> String {
        format!(
            "{}{}{}",
            self.base_url.trim_end_matches('/'),
            self.endpoint_path(endpoint),
            key
        )
    }

    /// Connect timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Overall request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Delay before retry number `retry` (0-based), doubling up to the cap
    pub fn backoff(&self, retry: u32) -> Duration {
        let delay_ms = self
            .initial_backoff_ms
            .saturating_mul(2u64.saturating_pow(retry))
            .min(self.max_backoff_ms);
        Duration::from_millis(delay_ms)
    }

    /// Check the settings are usable
    ///
    /// # Errors
    /// Returns [`LimsError::Configuration`] naming the first offending field.
    pub fn validate(&self) -> LimsResult<()> {
        if self.base_url.trim().is_empty() {
            return Err(LimsError::Configuration(
                "lims.base_url must be set".to_string(),
            ));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(LimsError::Configuration(format!(
                "lims.base_url must start with http:// or https://, got '{}'",
                self.base_url
            )));
        }
        if self.connect_timeout_secs == 0 || self.request_timeout_secs == 0 {
            return Err(LimsError::Configuration(
                "lims timeouts must be at least 1 second".to_string(),
            ));
        }
        Ok(())
    }
}
