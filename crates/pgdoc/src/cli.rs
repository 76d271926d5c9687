//! Command-line and environment options.

use std::path::PathBuf;

use clap::builder::BoolishValueParser;
use clap::Parser;
use pgdoc_core::logging::DEFAULT_LOG_DIR;
use pgdoc_core::models::connection::{DEFAULT_PG_PORT, DEFAULT_SSH_PORT};
use pgdoc_core::services::writer::DEFAULT_OUTPUT_DIR;
use pgdoc_core::{CatalogSet, ConnectionConfig, ConnectionOptions, Route, TunnelConfig};

/// pgdoc - document a PostgreSQL catalog as Markdown
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Database host
    #[arg(long, env = "DB_HOST")]
    pub db_host: Option<String>,

    /// Database name
    #[arg(long, env = "DB_NAME")]
    pub db_name: Option<String>,

    /// Database user
    #[arg(long, env = "DB_USER")]
    pub db_user: Option<String>,

    /// Database password
    #[arg(long, env = "DB_PASSWORD", hide_env_values = true)]
    pub db_password: Option<String>,

    /// Database port
    #[arg(long, env = "DB_PORT", default_value_t = DEFAULT_PG_PORT)]
    pub db_port: u16,

    /// Connect through an SSH bastion
    #[arg(long, env = "USE_SSH", value_parser = BoolishValueParser::new())]
    pub use_ssh: bool,

    /// SSH bastion host
    #[arg(long, env = "BASTION_HOST")]
    pub bastion_host: Option<String>,

    /// SSH bastion user
    #[arg(long, env = "BASTION_USER")]
    pub bastion_user: Option<String>,

    /// Private key file path, or the key content itself
    #[arg(long, env = "SSH_PRIVATE_KEY", hide_env_values = true)]
    pub ssh_private_key: Option<String>,

    /// SSH port on the bastion
    #[arg(long, env = "SSH_PORT", default_value_t = DEFAULT_SSH_PORT)]
    pub ssh_port: u16,

    /// Database host as seen from the bastion (defaults to the database host)
    #[arg(long, env = "REMOTE_DB_HOST")]
    pub remote_db_host: Option<String>,

    /// Database port as seen from the bastion
    #[arg(long, env = "REMOTE_DB_PORT", default_value_t = DEFAULT_PG_PORT)]
    pub remote_db_port: u16,

    /// Local tunnel port (0 picks a free port)
    #[arg(long, env = "LOCAL_PORT", default_value_t = DEFAULT_PG_PORT)]
    pub local_port: u16,

    /// Directory the Markdown files are written to
    #[arg(short, long, env = "CATALOG_OUTPUT_DIR", default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    /// Also document every table's columns
    #[arg(long, env = "INCLUDE_COLUMN_DETAILS", value_parser = BoolishValueParser::new())]
    pub include_column_details: bool,

    /// Database connect timeout in seconds
    #[arg(long, env = "CONNECT_TIMEOUT_SECS", default_value_t = 10)]
    pub connect_timeout_secs: u32,

    /// Per-query timeout in seconds
    #[arg(long, env = "QUERY_TIMEOUT_SECS")]
    pub query_timeout_secs: Option<u32>,

    /// Log directory
    #[arg(long, env = "PGDOC_LOG_DIR", default_value = DEFAULT_LOG_DIR)]
    pub log_dir: PathBuf,

    /// Log filter directives, e.g. `pgdoc=debug`
    #[arg(long, env = "PGDOC_LOG")]
    pub log_filter: Option<String>,
}

impl Cli {
    /// Database connection settings. Missing values stay empty and fail validation.
    pub fn connection_config(&self) -> ConnectionConfig {
        let options = ConnectionOptions {
            connect_timeout_secs: self.connect_timeout_secs,
            query_timeout_secs: self.query_timeout_secs,
            ..ConnectionOptions::default()
        };

        ConnectionConfig::new(
            value(&self.db_host),
            value(&self.db_name),
            value(&self.db_user),
            value(&self.db_password),
        )
        .with_port(self.db_port)
        .with_options(options)
    }

    /// Direct, or through the bastion when SSH is enabled.
    pub fn route(&self) -> Route {
        if !self.use_ssh {
            return Route::Direct;
        }

        let remote_host = self.remote_db_host.as_ref().or(self.db_host.as_ref());
        Route::Tunneled(
            TunnelConfig::new(
                value(&self.bastion_host),
                value(&self.bastion_user),
                value(&self.ssh_private_key),
                remote_host.cloned().unwrap_or_default(),
            )
            .with_ssh_port(self.ssh_port)
            .with_remote_port(self.remote_db_port)
            .with_local_port(self.local_port),
        )
    }

    /// The fixed catalogs, plus column details when requested.
    pub fn catalog_set(&self) -> CatalogSet {
        let catalogs = CatalogSet::postgres_default();
        if self.include_column_details {
            catalogs.with_column_details()
        } else {
            catalogs
        }
    }
}

fn value(option: &Option<String>) -> String {
    option.clone().unwrap_or_default()
}
