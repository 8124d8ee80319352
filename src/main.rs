//! Main entry point for the hn-ingest CLI

use clap::Parser;
use hn_ingest::cli::Cli;
use hn_ingest::shutdown::ShutdownCoordinator;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber with optional JSON formatting
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hn_ingest=info"));

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

    let shutdown = ShutdownCoordinator::shared();
    shutdown.listen_for_ctrl_c();

    let result = cli
        .execute(shutdown.clone())
        .await
        .map_err(|e| (e.exit_code(), anyhow::Error::new(e)));

    if let Err((code, e)) = result {
        error!("Crawl failed: {:#}", e);
        std::process::exit(code);
    }
}
