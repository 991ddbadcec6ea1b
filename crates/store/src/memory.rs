//! In-memory document store.
//!
//! Backs tests and local development. Implements the same CAS semantics as
//! the Postgres store: the map mutex is only held for the duration of one
//! read or one compare-and-swap, never across an await point.

use std::collections::HashMap;

use reelflow_core::document::WorkflowDocument;
use reelflow_core::types::DocId;
use tokio::sync::Mutex;

use crate::store::{DocumentStore, StoreError, Version, Versioned, WriteOutcome};

/// HashMap-backed [`DocumentStore`].
#[derive(Default)]
pub struct MemoryStore {
    docs: Mutex<HashMap<DocId, (WorkflowDocument, Version)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, doc: &WorkflowDocument) -> Result<Version, StoreError> {
        let mut docs = self.docs.lock().await;
        if docs.contains_key(&doc.id) {
            return Err(StoreError::AlreadyExists(doc.id));
        }
        let version = Version(1);
        docs.insert(doc.id, (doc.clone(), version));
        Ok(version)
    }

    async fn read(&self, id: DocId) -> Result<Versioned<WorkflowDocument>, StoreError> {
        let docs = self.docs.lock().await;
        let (doc, version) = docs.get(&id).ok_or(StoreError::NotFound(id))?;
        Ok(Versioned {
            value: doc.clone(),
            version: *version,
        })
    }

    async fn write_if_version(
        &self,
        id: DocId,
        expected: Version,
        doc: &WorkflowDocument,
    ) -> Result<WriteOutcome, StoreError> {
        let mut docs = self.docs.lock().await;
        let entry = docs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if entry.1 != expected {
            return Ok(WriteOutcome::Conflict);
        }
        let next = expected.next();
        *entry = (doc.clone(), next);
        Ok(WriteOutcome::Written(next))
    }
}
