//! Settings file
//!
//! Built-in defaults, overlaid by an optional TOML file, overlaid by CLI
//! flags and environment variables (see [`super::Cli::settings`]).

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::CliError;
use crate::aggregator::PipelineConfig;
use crate::lims::LimsConfig;

/// Everything a run needs besides the date range
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// LIMS connection
    #[serde(default)]
    pub lims: LimsConfig,
    /// Chunking and pools
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl Settings {
    /// Parse a settings document
    pub fn from_toml(content: &str) -> Result<Self, CliError> {
        toml::from_str(content)
            .map_err(|e| CliError::ConfigurationError(format!("invalid settings: {e}")))
    }

    /// Read and parse a settings file
    pub fn from_file(path: &Path) -> Result<Self, CliError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CliError::ConfigurationError(format!(
                "failed to read settings file '{}': {e}",
                path.display()
            ))
        })?;
        toml::from_str(&content).map_err(|e| {
            CliError::ConfigurationError(format!(
                "failed to parse settings file '{}': {e}",
                path.display()
            ))
        })
    }

    /// Check both sections
    pub fn validate(&self) -> Result<(), CliError> {
        self.lims.validate()?;
        self.pipeline.validate()?;
        Ok(())
    }
}
