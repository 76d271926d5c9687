//! Data models for pgdoc.
//!
//! This module contains all core data structures:
//! - `connection` - ConnectionConfig, TunnelConfig, Route, PoolSettings, PoolStatus
//! - `catalog` - CatalogName, CatalogQuery, CatalogSet, CatalogTable, CellValue
//! - `document` - rendered Markdown documents

pub mod catalog;
pub mod connection;
pub mod document;

pub use catalog::{CatalogName, CatalogQuery, CatalogSet, CatalogTable, CellValue, Layout};
pub use connection::{ConnectionConfig, ConnectionOptions, PoolSettings, PoolStatus, Route, TunnelConfig};
pub use document::{Document, HOME_DOCUMENT};
