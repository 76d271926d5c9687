//! Structured logging setup with console and file output.
//!
//! Provides:
//! - Daily rotating log files under the configured log directory
//! - Console-only fallback when file logging fails
//! - Environment variable override via PGDOC_LOG or RUST_LOG
//!
//! The entry point calls [`init_logging`] once and holds the returned guard;
//! library code only emits `tracing` events inside the spans the pipeline opens.
//! File output also records when each `catalog` span closes, with its timing,
//! so a run's log shows how long every catalog took.

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// Environment variable checked before `RUST_LOG`.
pub const LOG_ENV: &str = "PGDOC_LOG";

/// Default log directory, relative to the working directory.
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Log file name prefix; files are named `pgdoc.<date>.log`.
const LOG_FILE_PREFIX: &str = "pgdoc";

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Directory for log files
    pub log_dir: PathBuf,
    /// Whether stdout is an interactive terminal
    pub is_pty: bool,
    /// Optional custom log filter
    pub log_filter: Option<String>,
}

impl LogConfig {
    /// Create a new logging configuration.
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self { log_dir: log_dir.into(), is_pty: atty::is(atty::Stream::Stdout), log_filter: None }
    }

    /// Set custom log filter.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = Some(filter.into());
        self
    }

    /// Force file logging even when attached to a terminal.
    pub fn with_file_output(mut self) -> Self {
        self.is_pty = false;
        self
    }
}

/// Guard that must be held for the lifetime of the run.
///
/// Dropping this guard flushes pending log entries.
pub struct LoggingGuard {
    log_dir: Option<PathBuf>,
    _worker_guard: Option<WorkerGuard>,
}

impl LoggingGuard {
    /// Directory log files are written to, when file output is active.
    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }
}

/// Initialize logging with the given configuration.
///
/// If file logging initialization fails, falls back to console-only.
pub fn init_logging(config: LogConfig) -> LoggingGuard {
    let directives =
        filter_directives(config.log_filter.as_deref(), |key| std::env::var(key).ok());

    if config.is_pty {
        return init_stdout_logging(&directives);
    }

    match init_file_logging(&config.log_dir, &directives) {
        Ok(guard) => LoggingGuard { log_dir: Some(config.log_dir), _worker_guard: Some(guard) },
        Err(e) => {
            eprintln!("Warning: Failed to initialize file logging: {e}. Using console only.");
            init_stdout_logging(&directives)
        }
    }
}

/// Initialize stdout-only logging.
fn init_stdout_logging(directives: &str) -> LoggingGuard {
    // try_init: a subscriber may already be installed (tests, embedding callers)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(directives))
        .with_ansi(true)
        .with_target(false)
        .try_init();

    LoggingGuard { log_dir: None, _worker_guard: None }
}

/// Initialize file + console logging.
fn init_file_logging(
    log_dir: &Path,
    directives: &str,
) -> Result<WorkerGuard, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .build(log_dir)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let stdout = std::io::stdout.with_max_level(tracing::Level::INFO);

    tracing_subscriber::fmt()
        .with_writer(stdout.and(non_blocking))
        .with_env_filter(env_filter(directives))
        .with_ansi(false)
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .try_init()
        .map_err(|e| e.to_string())?;

    Ok(guard)
}

/// Pick the filter directives: custom filter > PGDOC_LOG > RUST_LOG > default.
///
/// Blank values are skipped so an exported but empty variable does not
/// silence logging.
fn filter_directives(custom: Option<&str>, lookup: impl Fn(&str) -> Option<String>) -> String {
    custom
        .map(str::to_string)
        .into_iter()
        .chain(lookup(LOG_ENV))
        .chain(lookup("RUST_LOG"))
        .find(|directives| !directives.trim().is_empty())
        .unwrap_or_else(|| default_log_filter().to_string())
}

/// Parse directives, falling back to the default filter when they are malformed.
fn env_filter(directives: &str) -> EnvFilter {
    EnvFilter::try_new(directives).unwrap_or_else(|e| {
        eprintln!("Warning: Invalid log filter '{directives}': {e}. Using default.");
        EnvFilter::new(default_log_filter())
    })
}

/// Get the default log filter based on build type.
pub fn default_log_filter() -> &'static str {
    #[cfg(debug_assertions)]
    {
        "debug,pgdoc=trace,pgdoc_core=trace,tokio_postgres=warn,russh=warn"
    }
    #[cfg(not(debug_assertions))]
    {
        "info,pgdoc=info,pgdoc_core=info,tokio_postgres=warn,russh=warn"
    }
}
