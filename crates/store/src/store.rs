//! The document store contract.

use reelflow_core::document::WorkflowDocument;
use reelflow_core::types::DocId;
use serde::{Deserialize, Serialize};

/// Opaque compare-and-swap token for a stored document.
///
/// Monotonically increasing per document; a successful conditional write
/// bumps it by one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version(pub i64);

impl Version {
    pub fn next(self) -> Version {
        Version(self.0 + 1)
    }
}

/// A document paired with the version it was read at.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub value: T,
    pub version: Version,
}

/// Result of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write applied; this is the document's new version.
    Written(Version),
    /// Another writer got there first; re-read and retry.
    Conflict,
}

/// Errors from the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Document {0} not found")]
    NotFound(DocId),

    #[error("Document {0} already exists")]
    AlreadyExists(DocId),

    /// Backend failure (connection, serialization, corrupt row).
    #[error("Store backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for reelflow_core::error::CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => reelflow_core::error::CoreError::NotFound {
                entity: "WorkflowDocument",
                id: id.to_string(),
            },
            StoreError::AlreadyExists(id) => reelflow_core::error::CoreError::Conflict(format!(
                "Document {id} already exists"
            )),
            StoreError::Backend(msg) => reelflow_core::error::CoreError::Internal(msg),
        }
    }
}

/// Read/write access to workflow documents with per-document optimistic
/// concurrency. No lock is ever held across an await point; concurrent
/// writers are serialized by version conflicts alone.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a brand-new document at version 1.
    async fn insert(&self, doc: &WorkflowDocument) -> Result<Version, StoreError>;

    /// Read a document and the version token to condition writes on.
    async fn read(&self, id: DocId) -> Result<Versioned<WorkflowDocument>, StoreError>;

    /// Write the document back iff its stored version still equals
    /// `expected`.
    async fn write_if_version(
        &self,
        id: DocId,
        expected: Version,
        doc: &WorkflowDocument,
    ) -> Result<WriteOutcome, StoreError>;
}
