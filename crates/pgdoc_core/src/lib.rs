//! Core types and services for pgdoc.
//!
//! This crate connects to PostgreSQL, optionally through an SSH tunnel, and
//! documents its catalog as Markdown:
//!
//! - **error**: Error handling with PostgreSQL-specific details
//! - **models**: Connection settings, catalog queries and result tables
//! - **queries**: The built-in introspection queries
//! - **services**: Tunneling, pooling, query execution, rendering and writing
//! - **logging**: Structured logging setup

pub mod error;
pub mod logging;
pub mod models;
pub mod queries;
pub mod services;

pub use error::{PgDocError, PgDocResult};
pub use models::{
    CatalogName, CatalogQuery, CatalogSet, CatalogTable, CellValue, ConnectionConfig,
    ConnectionOptions, Document, Layout, PoolSettings, PoolStatus, Route, TunnelConfig,
};
pub use services::{
    CatalogPipeline, CatalogSource, ConnectionManager, DocumentWriter, Engine, RunSummary,
    Session, SshTunnelProvisioner, Tunnel, TunnelProvisioner,
};
