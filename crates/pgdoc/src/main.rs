//! pgdoc - Markdown documentation of a PostgreSQL catalog.

mod cli;

use std::process::ExitCode;

use clap::Parser;
use pgdoc_core::logging::{init_logging, LogConfig};
use pgdoc_core::{CatalogPipeline, ConnectionManager, DocumentWriter, PgDocError, RunSummary};
use tracing::{error, info};

use cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine; the environment may already be set
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let mut log_config = LogConfig::new(&cli.log_dir);
    if let Some(filter) = &cli.log_filter {
        log_config = log_config.with_filter(filter);
    }
    let logging_guard = init_logging(log_config);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting pgdoc");
    if let Some(log_dir) = logging_guard.log_dir() {
        info!(log_dir = %log_dir.display(), "Writing log files");
    }

    match run(&cli).await {
        Ok(summary) => {
            info!(
                documents = summary.written.len(),
                rows = summary.total_rows,
                output_dir = %cli.output_dir.display(),
                "Catalog documentation written"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(
                category = e.category(),
                stage = if e.is_setup_failure() { "connect" } else { "catalog" },
                hint = e.hint().unwrap_or_default(),
                error = %e,
                "pgdoc failed"
            );
            ExitCode::FAILURE
        }
    }
}

/// Connect, document every catalog, and release the session on every path.
async fn run(cli: &Cli) -> Result<RunSummary, PgDocError> {
    let config = cli.connection_config();
    let route = cli.route();
    let catalogs = cli.catalog_set();
    let writer = DocumentWriter::new(&cli.output_dir);

    let session = ConnectionManager::new().connect(&config, &route).await?;
    if let Some(tunnel) = session.tunnel() {
        info!(local_addr = %tunnel.local_addr(), remote = %tunnel.remote_target(), "Tunnel open");
    }

    let result = CatalogPipeline::run(session.engine(), &catalogs, &writer).await;
    session.close();
    result
}
