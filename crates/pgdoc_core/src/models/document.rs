//! Rendered Markdown documents.

use serde::Serialize;

/// Name of the index document.
pub const HOME_DOCUMENT: &str = "Home";

/// A rendered Markdown body and the name it is written under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    /// File stem; the writer appends `.md`
    pub name: String,
    /// Markdown body
    pub body: String,
}

impl Document {
    /// Create a document.
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self { name: name.into(), body: body.into() }
    }

    /// Target file name.
    pub fn file_name(&self) -> String {
        format!("{}.md", self.name)
    }

    /// Check if this is the index document.
    pub fn is_home(&self) -> bool {
        self.name == HOME_DOCUMENT
    }
}
