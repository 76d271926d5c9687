//! Writes rendered documents to the output directory.

use std::path::{Path, PathBuf};

use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::error::PgDocError;
use crate::models::Document;

/// Default output directory, relative to the working directory.
pub const DEFAULT_OUTPUT_DIR: &str = "catalog_docs";

/// Persists documents as `<directory>/<name>.md`.
#[derive(Debug, Clone)]
pub struct DocumentWriter {
    directory: PathBuf,
}

impl DocumentWriter {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self { directory: directory.into() }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path a document will be written to.
    pub fn path_for(&self, document: &Document) -> PathBuf {
        self.directory.join(document.file_name())
    }

    /// Write the document, creating the directory and replacing any existing file.
    ///
    /// The file handle is released before this returns, on success or failure.
    pub async fn write(&self, document: &Document) -> Result<PathBuf, PgDocError> {
        fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| PgDocError::write(&self.directory, e))?;

        let path = self.path_for(document);
        let file = File::create(&path).await.map_err(|e| PgDocError::write(&path, e))?;
        let mut out = BufWriter::new(file);
        out.write_all(document.body.as_bytes())
            .await
            .map_err(|e| PgDocError::write(&path, e))?;
        out.flush().await.map_err(|e| PgDocError::write(&path, e))?;

        debug!(path = %path.display(), bytes = document.body.len(), "Document written");
        Ok(path)
    }
}

impl Default for DocumentWriter {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_DIR)
    }
}
