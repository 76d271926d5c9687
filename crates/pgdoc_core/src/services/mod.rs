//! Backend services for pgdoc.
//!
//! This module contains the documentation pipeline, leaf-first:
//! - `ssh_tunnel` - SSH port forwarding through a bastion with russh
//! - `connection` - Pooled connections with deadpool-postgres and session lifecycle
//! - `catalog` - Catalog query execution and cell decoding
//! - `markdown` - Markdown rendering of catalogs and the home page
//! - `writer` - Document persistence
//! - `pipeline` - The sequential fetch, render and write run

pub mod catalog;
pub mod connection;
pub mod markdown;
pub mod pipeline;
pub mod ssh_tunnel;
pub mod writer;

pub use catalog::CatalogSource;
pub use connection::{ConnectionManager, Engine, Link, Session};
pub use pipeline::{CatalogPipeline, RunSummary};
pub use ssh_tunnel::{SshTunnelProvisioner, Tunnel, TunnelProvisioner};
pub use writer::DocumentWriter;
