//! Optimistic-concurrency document updates.
//!
//! Every document mutation in the system goes through one combinator:
//! read the document and its version, apply a mutation in memory, write back
//! conditioned on the version, and on conflict retry with exponential
//! backoff plus jitter. After the attempts are exhausted the conflict
//! surfaces to the calling operation, which is expected to retry the whole
//! operation rather than just the write.

use reelflow_core::document::{ItemPatch, WorkflowDocument};
use reelflow_core::error::{CoreError, CoreResult};
use reelflow_core::retry::RetryPolicy;
use reelflow_core::types::DocId;

use crate::store::{DocumentStore, WriteOutcome};

/// Applies mutations to stored documents under compare-and-swap.
#[derive(Clone)]
pub struct DocumentUpdater {
    policy: RetryPolicy,
}

impl Default for DocumentUpdater {
    fn default() -> Self {
        Self {
            policy: RetryPolicy::default(),
        }
    }
}

impl DocumentUpdater {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Apply `mutate` to the document under optimistic retry.
    ///
    /// The mutator runs against a fresh read on every attempt, so it must be
    /// idempotent with respect to the document state. A mutator returning
    /// `Err` aborts immediately without retrying (the failure is not a write
    /// conflict). Returns the document as written.
    pub async fn update_document<F>(
        &self,
        store: &dyn DocumentStore,
        id: DocId,
        mut mutate: F,
    ) -> CoreResult<WorkflowDocument>
    where
        F: FnMut(&mut WorkflowDocument) -> CoreResult<()> + Send,
    {
        for attempt in 1..=self.policy.max_attempts {
            let versioned = store.read(id).await?;
            let mut doc = versioned.value;
            mutate(&mut doc)?;

            match store.write_if_version(id, versioned.version, &doc).await? {
                WriteOutcome::Written(_) => return Ok(doc),
                WriteOutcome::Conflict => {
                    if attempt == self.policy.max_attempts {
                        break;
                    }
                    let delay = self.policy.backoff_delay(attempt);
                    tracing::debug!(
                        document_id = %id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Write conflict, retrying",
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        tracing::warn!(
            document_id = %id,
            attempts = self.policy.max_attempts,
            "Optimistic retries exhausted",
        );
        Err(CoreError::Conflict(format!(
            "Document {id} update lost {} consecutive races",
            self.policy.max_attempts
        )))
    }

    /// Apply a partial patch to one item, addressed by positional index.
    pub async fn apply_item_patch(
        &self,
        store: &dyn DocumentStore,
        id: DocId,
        index: usize,
        patch: &ItemPatch,
    ) -> CoreResult<WorkflowDocument> {
        self.update_document(store, id, |doc| doc.apply_item_patch(index, patch))
            .await
    }
}
