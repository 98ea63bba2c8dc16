//! Knowledge store collaborators consumed by the knowledge tools
//!
//! How documents are indexed and retrieved is the store's business; the chat
//! engine only sees these traits.

mod local;

pub use local::LocalKnowledgeBase;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// File extensions loaded as documents
const DOCUMENT_EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

pub fn is_document_extension(ext: &str) -> bool {
    DOCUMENT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
}

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("knowledge source {0} does not exist")]
    NotFound(String),
    #[error("failed to read documents: {0}")]
    Io(#[from] std::io::Error),
    #[error("document loading was interrupted: {0}")]
    Interrupted(String),
}

/// A single retrieved passage
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub document_id: String,
    pub text: String,
}

/// Semantic or keyword search over ingested documents
#[async_trait]
pub trait DocumentSearch: Send + Sync {
    /// Load (or reload) the documents searches run against. Returns the number
    /// of searchable passages.
    async fn load_documents(&self) -> Result<usize, KnowledgeError>;

    /// Best passages for `phrase`, most relevant first. With a filename filter
    /// only that document is searched.
    async fn search(
        &self,
        phrase: &str,
        filename_filter: Option<&str>,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, KnowledgeError>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeSourceDetails {
    pub name: String,
    pub kind: String,
    pub location: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncState {
    NotLoaded,
    Ready,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeSourceStatus {
    pub name: String,
    pub state: SyncState,
    pub document_count: usize,
    pub passage_count: usize,
    pub last_loaded_at: Option<DateTime<Utc>>,
}

/// Metadata about the backing store
#[async_trait]
pub trait KnowledgeSource: Send + Sync {
    async fn details(&self, name: &str) -> Result<KnowledgeSourceDetails, KnowledgeError>;

    async fn status(&self, name: &str) -> Result<KnowledgeSourceStatus, KnowledgeError>;
}
