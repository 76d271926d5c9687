//! Error types for pgdoc.
//!
//! One variant per failure class of a documentation run. Every variant carries
//! enough context (catalog name, connection target, file path) to produce a
//! log line that names the operation and target that failed.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Boxed underlying error.
type Source = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for pgdoc.
#[derive(Debug, Error)]
pub enum PgDocError {
    /// Missing or invalid connection, tunnel or catalog parameters.
    #[error("Config error: {message}")]
    Config {
        /// Human-readable error message.
        message: String,
    },

    /// SSH connect or authentication failure.
    #[error("SSH tunnel error ({target}): {message}")]
    TunnelEstablish {
        /// `user@host:port` of the bastion.
        target: String,
        /// Human-readable error message.
        message: String,
        /// Actionable hint for the user.
        hint: Option<String>,
        /// Optional underlying error source.
        #[source]
        source: Option<Source>,
    },

    /// Database unreachable or the liveness check failed.
    #[error("Connection error ({target}): {message}")]
    ConnectionValidation {
        /// `user@host:port/database`, never including the password.
        target: String,
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Source>,
    },

    /// An introspection query failed for one catalog.
    #[error("Query error in {catalog}: {message}")]
    QueryExecution {
        /// Catalog whose query failed.
        catalog: String,
        /// PostgreSQL error message.
        message: String,
        /// Additional detail from PostgreSQL.
        detail: Option<String>,
        /// PostgreSQL hint.
        hint: Option<String>,
        /// PostgreSQL error code (e.g., "42P01").
        code: Option<String>,
        /// Optional underlying error source.
        #[source]
        source: Option<Source>,
    },

    /// A result set could not be rendered (e.g. a missing expected column).
    #[error("Render error in {catalog}: {message}")]
    Render {
        /// Catalog being rendered.
        catalog: String,
        /// Human-readable error message.
        message: String,
    },

    /// Filesystem failure creating the output directory or a document.
    #[error("Write error for {}: {source}", path.display())]
    Write {
        /// Directory or file that could not be written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Unexpected internal error.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
    },
}

impl PgDocError {
    // ========== Constructors ==========

    /// Create a new config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create a new tunnel error with an actionable hint.
    pub fn tunnel_with_hint(
        target: impl Into<String>,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        Self::TunnelEstablish {
            target: target.into(),
            message: message.into(),
            hint: Some(hint.into()),
            source: None,
        }
    }

    /// Create a new tunnel error wrapping its cause.
    pub fn tunnel_with_source(
        target: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::TunnelEstablish {
            target: target.into(),
            message: message.into(),
            hint: None,
            source: Some(Box::new(source)),
        }
    }

    /// Create a new connection validation error.
    pub fn connection(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConnectionValidation { target: target.into(), message: message.into(), source: None }
    }

    /// Create a new connection validation error with source.
    pub fn connection_with_source(
        target: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::ConnectionValidation {
            target: target.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a query error without server details.
    pub fn query(catalog: impl Into<String>, message: impl Into<String>) -> Self {
        Self::QueryExecution {
            catalog: catalog.into(),
            message: message.into(),
            detail: None,
            hint: None,
            code: None,
            source: None,
        }
    }

    /// Create a query error wrapping the failure that stopped the query.
    pub fn query_with_source(
        catalog: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::QueryExecution {
            catalog: catalog.into(),
            message: message.into(),
            detail: None,
            hint: None,
            code: None,
            source: Some(Box::new(source)),
        }
    }

    /// Wrap a driver error raised while running a catalog's query.
    ///
    /// Server-side failures keep their SQLSTATE code, detail and hint. The
    /// driver error is kept as the source either way.
    pub fn from_postgres(catalog: impl Into<String>, err: tokio_postgres::Error) -> Self {
        let catalog = catalog.into();
        let Some(db_err) = err.as_db_error() else {
            let message = err.to_string();
            return Self::query_with_source(catalog, message, err);
        };
        let message = db_err.message().to_string();
        let detail = db_err.detail().map(String::from);
        let hint = db_err.hint().map(String::from);
        let code = Some(db_err.code().code().to_string());
        Self::QueryExecution { catalog, message, detail, hint, code, source: Some(Box::new(err)) }
    }

    /// Create a new render error.
    pub fn render(catalog: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Render { catalog: catalog.into(), message: message.into() }
    }

    /// Create a new write error.
    pub fn write(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Write { path: path.as_ref().to_path_buf(), source }
    }

    /// Create a new internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    // ========== Methods ==========

    /// Get the error category name.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config { .. } => "Config",
            Self::TunnelEstablish { .. } => "SSH",
            Self::ConnectionValidation { .. } => "Connection",
            Self::QueryExecution { .. } => "Query",
            Self::Render { .. } => "Render",
            Self::Write { .. } => "Write",
            Self::Internal { .. } => "Internal",
        }
    }

    /// Get actionable hint for the user.
    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::Config { .. } => Some("Check the DB_* and BASTION_* settings"),
            Self::TunnelEstablish { hint, .. } => {
                hint.as_deref().or(Some("Verify the bastion host is reachable"))
            }
            Self::ConnectionValidation { .. } => Some("Check that the database server is running"),
            Self::QueryExecution { hint, .. } => hint.as_deref(),
            Self::Render { .. } => Some("The catalog query returned an unexpected shape"),
            Self::Write { .. } => Some("Check file permissions and disk space"),
            Self::Internal { .. } => Some("Please report this issue"),
        }
    }

    /// Get the catalog this error belongs to, if any.
    pub fn catalog(&self) -> Option<&str> {
        match self {
            Self::QueryExecution { catalog, .. } | Self::Render { catalog, .. } => Some(catalog),
            _ => None,
        }
    }

    /// Get PostgreSQL error code (if applicable).
    pub fn pg_code(&self) -> Option<&str> {
        match self {
            Self::QueryExecution { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Whether this error aborts the run before any catalog is processed.
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            Self::Config { .. } | Self::TunnelEstablish { .. } | Self::ConnectionValidation { .. }
        )
    }
}

/// Convenience result alias.
pub type PgDocResult<T> = Result<T, PgDocError>;
