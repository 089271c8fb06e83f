//! Command line interface

pub mod error;
pub mod settings;

pub use error::CliError;
pub use settings::Settings;

use clap::Parser;
use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::aggregator::{RequestAggregator, RunSummary};
use crate::date_range;
use crate::lims::LimsRestClient;
use crate::metrics;
use crate::publisher::{NdjsonPublisher, PublishError, Publisher};
use crate::shutdown::SharedShutdown;

/// Parse a chunk size or pool width
fn parse_width(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if value == 0 {
        return Err("must be at least 1".to_string());
    }
    Ok(value)
}

/// LIMS request publisher
#[derive(Parser, Debug)]
#[command(name = "lims-publisher")]
#[command(about = "Publish LIMS requests delivered within a date range", long_about = None)]
#[command(version)]
pub struct Cli {
    /// First delivery day, YYYY/MM/DD (UTC)
    #[arg(long)]
    pub start_date: String,

    /// Last delivery day, YYYY/MM/DD (UTC); open-ended when omitted
    #[arg(long)]
    pub end_date: Option<String>,

    /// Settings file (TOML)
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// LimsRest base URL, e.g. https://lims.example.org
    #[arg(long, env = "LIMS_BASE_URL")]
    pub base_url: Option<String>,

    /// Basic auth user
    #[arg(long, env = "LIMS_USERNAME")]
    pub username: Option<String>,

    /// Basic auth password
    #[arg(long, env = "LIMS_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Requests per chunk (default: 10)
    #[arg(long, value_parser = parse_width)]
    pub chunk_size: Option<usize>,

    /// Requests processed concurrently within a chunk (default: 10)
    #[arg(long, value_parser = parse_width)]
    pub processing_pool: Option<usize>,

    /// Manifest fetches in flight at once (default: 5)
    #[arg(long, value_parser = parse_width)]
    pub fetch_pool: Option<usize>,

    /// Skip TLS certificate verification
    #[arg(long, default_value_t = false)]
    pub accept_invalid_certs: bool,

    /// Overall timeout per LIMS call in seconds (default: 30)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout_secs: Option<u64>,

    /// Retries on network errors and 5xx (default: 2, range: 0-10)
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..=10))]
    pub max_retries: Option<u32>,

    /// Write published requests here instead of stdout (NDJSON)
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}

impl Cli {
    /// Resolve settings: defaults, then the settings file, then flags and env
    pub fn settings(&self) -> Result<Settings, CliError> {
        let mut settings = match &self.config {
            Some(path) => Settings::from_file(path)?,
            None => Settings::default(),
        };

        let lims = &mut settings.lims;
        if let Some(base_url) = &self.base_url {
            lims.base_url = base_url.clone();
        }
        if let Some(username) = &self.username {
            lims.username = username.clone();
        }
        if let Some(password) = &self.password {
            lims.password = password.clone();
        }
        if self.accept_invalid_certs {
            lims.accept_invalid_certs = true;
        }
        if let Some(timeout_secs) = self.timeout_secs {
            lims.request_timeout_secs = timeout_secs;
        }
        if let Some(max_retries) = self.max_retries {
            lims.max_retries = max_retries;
        }

        let pipeline = &mut settings.pipeline;
        if let Some(chunk_size) = self.chunk_size {
            pipeline.chunk_size = chunk_size;
        }
        if let Some(width) = self.processing_pool {
            pipeline.processing_pool_width = width;
        }
        if let Some(width) = self.fetch_pool {
            pipeline.fetch_pool_width = width;
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Run the pipeline and print the failure report.
    ///
    /// Dates are checked before anything touches the network. The report
    /// goes to stdout when results are written to a file, and to stderr when
    /// stdout carries the results.
    pub async fn execute(&self, shutdown: SharedShutdown) -> Result<RunSummary, CliError> {
        let interval = date_range::resolve(&self.start_date, self.end_date.as_deref())?;
        let settings = self.settings()?;

        if let Some(addr) = self.metrics_addr {
            metrics::init_metrics(addr)?;
        }

        info!(
            %interval,
            base_url = %settings.lims.base_url,
            chunk_size = settings.pipeline.chunk_size,
            "Starting publisher run"
        );

        let client = LimsRestClient::new(&settings.lims)?.with_shutdown(shutdown.clone());
        let aggregator =
            RequestAggregator::new(Arc::new(client), settings.pipeline).with_shutdown(shutdown);

        let publisher: Box<dyn Publisher> = match &self.output {
            Some(path) => Box::new(NdjsonPublisher::create(path)?),
            None => Box::new(NdjsonPublisher::stdout()),
        };

        let summary = aggregator.run(&interval, &*publisher).await?;

        let report = summary.ledger.render();
        let written = if self.output.is_some() {
            std::io::stdout().write_all(report.as_bytes())
        } else {
            std::io::stderr().write_all(report.as_bytes())
        };
        written.map_err(PublishError::from)?;

        Ok(summary)
    }
}
