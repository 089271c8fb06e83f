//! CLI error types and conversions

use crate::aggregator::AggregatorError;
use crate::date_range::DateRangeError;
use crate::lims::LimsError;
use crate::metrics::MetricsError;
use crate::publisher::PublishError;

/// Exit status for an unusable date range
pub const EXIT_INVALID_DATES: i32 = 2;
/// Exit status for every other fatal error
pub const EXIT_FAILURE: i32 = 1;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Date range error
    #[error("date range error: {0}")]
    DateRangeError(#[from] DateRangeError),

    /// LIMS client error
    #[error("LIMS error: {0}")]
    LimsError(#[from] LimsError),

    /// Aggregation run error
    #[error("run error: {0}")]
    AggregatorError(#[from] AggregatorError),

    /// Output sink error
    #[error("output error: {0}")]
    PublishError(#[from] PublishError),

    /// Metrics exporter error
    #[error("metrics error: {0}")]
    MetricsError(#[from] MetricsError),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}

impl CliError {
    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::DateRangeError(_) => EXIT_INVALID_DATES,
            _ => EXIT_FAILURE,
        }
    }
}
