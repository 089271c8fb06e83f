//! Main entry point for the lims-publisher CLI

use clap::Parser;
use lims_publisher::cli::Cli;
use lims_publisher::shutdown::{self, ShutdownSignal};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Initialize tracing on stderr, JSON when `LOG_FORMAT=json`
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lims_publisher=info"));

    // Stdout may carry published results, so logs stay on stderr.
    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    let shutdown = ShutdownSignal::shared();
    shutdown::set_global_shutdown(shutdown.clone());
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl+C received - finishing current chunk");
                shutdown.raise();
            }
        }
    });

    match cli.execute(shutdown).await {
        Ok(summary) => info!(
            requests_published = summary.requests_published,
            requests_failed = summary.requests_failed,
            samples_failed = summary.samples_failed,
            cancelled = summary.cancelled,
            "Publisher finished"
        ),
        Err(e) => {
            error!("Command failed: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}
