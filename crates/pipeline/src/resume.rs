//! Crash recovery for a loaded document.
//!
//! After a restart the document may carry items that were mid-flight when
//! the process died. Two cases, decided purely from persisted state:
//!
//! - awaiting with a job handle: the provider still knows the job, so the
//!   poller re-attaches to it without a second submission;
//! - awaiting without a handle: the crash happened between marking the item
//!   in-progress and persisting the handle, the job is unrecoverable and the
//!   item is errored with a retry hint.
//!
//! At most one resume runs per document at a time; overlapping calls are
//! no-ops.

use reelflow_core::document::{WorkItem, WorkflowDocument, WorkflowStatus, INTERRUPTED_RETRY};
use reelflow_core::error::{CoreError, CoreResult};
use reelflow_core::types::{DocId, ItemKind};
use std::sync::Arc;

use crate::batch::run_unbounded;
use crate::context::DocRuntime;
use crate::controller::{advance, PipelineDeps};
use crate::item::poll_to_terminal;

/// An item that survived a crash with its provider job intact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumableItem {
    pub kind: ItemKind,
    pub index: usize,
    pub job_handle: String,
}

fn scan<I: WorkItem>(items: &[I], kind: ItemKind, resumable: &mut Vec<ResumableItem>) {
    for (index, item) in items.iter().enumerate() {
        if !item.is_awaiting() {
            continue;
        }
        if let Some(handle) = item.job_handle() {
            resumable.push(ResumableItem {
                kind,
                index,
                job_handle: handle.to_string(),
            });
        }
    }
}

/// Items awaiting a provider result with a persisted job handle.
pub fn find_resumable(doc: &WorkflowDocument) -> Vec<ResumableItem> {
    let mut resumable = Vec::new();
    scan(&doc.characters, ItemKind::Character, &mut resumable);
    scan(&doc.scenes, ItemKind::Scene, &mut resumable);
    scan(&doc.videos, ItemKind::Video, &mut resumable);
    resumable
}

/// Number of items awaiting without a handle (the unrecoverable stuck
/// state).
pub fn count_stuck(doc: &WorkflowDocument) -> usize {
    let stuck = |item: &dyn WorkItem| item.is_awaiting() && item.job_handle().is_none();
    doc.characters.iter().filter(|i| stuck(*i)).count()
        + doc.scenes.iter().filter(|i| stuck(*i)).count()
        + doc.videos.iter().filter(|i| stuck(*i)).count()
}

/// Resume a document after a restart: error the stuck items, re-attach the
/// poller to every item with a surviving job handle, and advance once they
/// settle.
///
/// Only a `running` document has anything to resume; anything else is
/// returned unchanged. Re-entrant calls for the same document are folded
/// into the in-flight resume.
pub async fn resume_document(
    deps: &PipelineDeps,
    runtime: &Arc<DocRuntime>,
    id: DocId,
) -> CoreResult<WorkflowDocument> {
    let Some(_resume_guard) = runtime.try_begin_resume() else {
        tracing::debug!(document_id = %id, "Resume already in flight");
        return Ok(deps.store.read(id).await?.value);
    };
    // Live pipelines already own these items; resuming would double-poll.
    if runtime.active_ops() > 0 {
        return Ok(deps.store.read(id).await?.value);
    }

    let doc = deps.store.read(id).await?.value;
    if doc.status != WorkflowStatus::Running {
        return Ok(doc);
    }

    // Reclassify the stuck items first so the poll fan-out below works from
    // settled state.
    let doc = deps
        .updater
        .update_document(deps.store.as_ref(), id, |doc| {
            let stuck = |item: &dyn WorkItem| item.is_awaiting() && item.job_handle().is_none();
            for item in doc.characters.iter_mut() {
                if stuck(&*item) {
                    item.fail(INTERRUPTED_RETRY);
                }
            }
            for item in doc.scenes.iter_mut() {
                if stuck(&*item) {
                    item.fail(INTERRUPTED_RETRY);
                }
            }
            for item in doc.videos.iter_mut() {
                if stuck(&*item) {
                    item.fail(INTERRUPTED_RETRY);
                }
            }
            Ok(())
        })
        .await?;

    let resumable = find_resumable(&doc);
    if resumable.is_empty() {
        return advance(deps, id).await;
    }

    tracing::info!(
        document_id = %id,
        stage = %doc.stage,
        resumable = resumable.len(),
        "Resuming interrupted items",
    );

    let _op = runtime.begin_op();
    let cancel = runtime.renewed_token();
    let env = crate::item::ItemRunEnv {
        store: deps.store.as_ref(),
        provider: deps.provider.as_ref(),
        updater: &deps.updater,
    };
    let results = run_unbounded(resumable, |item: ResumableItem| {
        let env = &env;
        let cancel = &cancel;
        async move {
            poll_to_terminal(env, id, item.kind, item.index, &item.job_handle, cancel).await
        }
    })
    .await;

    for result in results {
        match result {
            Ok(()) => {}
            Err(CoreError::Cancelled) => {
                tracing::info!(document_id = %id, "Resume cancelled");
                return deps.store.read(id).await.map(|v| v.value).map_err(Into::into);
            }
            Err(e) => tracing::error!(document_id = %id, error = %e, "Resumed item failed"),
        }
    }

    advance(deps, id).await
}
