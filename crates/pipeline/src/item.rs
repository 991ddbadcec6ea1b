//! The per-item submit+poll pipeline.
//!
//! One invocation drives a single work item from `pending` to a terminal
//! state, persisting every intermediate step through the document updater so
//! partial progress survives a crash:
//!
//! 1. mark the item in-progress (no handle yet),
//! 2. submit to the provider,
//! 3. inline result → terminal `done`; job handle → persist the handle
//!    *before* polling,
//! 4. poll to completion and persist the terminal outcome.
//!
//! A cancellation observed mid-poll leaves the item untouched; the stop flow
//! owns the resulting item status.

use reelflow_core::document::ItemPatch;
use reelflow_core::error::{CoreError, CoreResult};
use reelflow_core::types::{DocId, ItemKind};
use reelflow_provider::poll::{poll_job, IMAGE_POLL, VIDEO_POLL};
use reelflow_provider::submit::submit_task;
use reelflow_provider::traits::{GenerationProvider, GenerationRequest, SubmitOutcome};
use reelflow_store::{DocumentStore, DocumentUpdater};
use tokio_util::sync::CancellationToken;

/// Shared dependencies for item runs.
pub struct ItemRunEnv<'a> {
    pub store: &'a dyn DocumentStore,
    pub provider: &'a dyn GenerationProvider,
    pub updater: &'a DocumentUpdater,
}

/// Poll cadence for the item kind: images 3s, videos 5s.
fn poll_config(kind: ItemKind) -> reelflow_provider::poll::PollConfig {
    match kind {
        ItemKind::Character | ItemKind::Scene => IMAGE_POLL,
        ItemKind::Video => VIDEO_POLL,
    }
}

/// Run one item's full submit+poll pipeline.
///
/// Item-level failures (submission rejected, provider error, timeout) are
/// recorded on the item and reported as `Ok(())` so sibling items are never
/// affected. `Err` is reserved for infrastructure failures (document gone,
/// CAS exhausted) and cancellation.
pub async fn run_item(
    env: &ItemRunEnv<'_>,
    doc_id: DocId,
    kind: ItemKind,
    index: usize,
    request: &GenerationRequest,
    cancel: &CancellationToken,
) -> CoreResult<()> {
    if cancel.is_cancelled() {
        return Err(CoreError::Cancelled);
    }

    env.updater
        .apply_item_patch(env.store, doc_id, index, &ItemPatch::in_progress(kind))
        .await?;

    let outcome = match submit_task(env.provider, request).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::warn!(document_id = %doc_id, kind = %kind, index, error = %e, "Submission failed");
            env.updater
                .apply_item_patch(env.store, doc_id, index, &ItemPatch::failed(kind, e.to_string()))
                .await?;
            return Ok(());
        }
    };

    let job_handle = match outcome {
        SubmitOutcome::Completed { output_url } => {
            env.updater
                .apply_item_patch(env.store, doc_id, index, &ItemPatch::done(kind, output_url))
                .await?;
            return Ok(());
        }
        SubmitOutcome::Queued { job_handle } => {
            // Persist the handle before the first poll; a crash after this
            // point is resumable.
            env.updater
                .apply_item_patch(
                    env.store,
                    doc_id,
                    index,
                    &ItemPatch::handle(kind, job_handle.clone()),
                )
                .await?;
            job_handle
        }
    };

    poll_to_terminal(env, doc_id, kind, index, &job_handle, cancel).await
}

/// Poll an already-submitted job to a terminal state and persist the
/// outcome. Also the resume path: re-enters polling without re-submitting.
pub async fn poll_to_terminal(
    env: &ItemRunEnv<'_>,
    doc_id: DocId,
    kind: ItemKind,
    index: usize,
    job_handle: &str,
    cancel: &CancellationToken,
) -> CoreResult<()> {
    let result = poll_job(env.provider, job_handle, poll_config(kind), || {
        !cancel.is_cancelled()
    })
    .await;

    match result {
        Ok(output_url) => {
            env.updater
                .apply_item_patch(env.store, doc_id, index, &ItemPatch::done(kind, output_url))
                .await?;
            Ok(())
        }
        Err(CoreError::Cancelled) => {
            // The stop flow patches the item; nothing to record here.
            Err(CoreError::Cancelled)
        }
        Err(e) => {
            tracing::warn!(document_id = %doc_id, kind = %kind, index, error = %e, "Item failed");
            env.updater
                .apply_item_patch(env.store, doc_id, index, &ItemPatch::failed(kind, e.to_string()))
                .await?;
            Ok(())
        }
    }
}
