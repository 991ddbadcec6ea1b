//! Stage control: applying advance decisions, entering the next stage on
//! `continue`, fanning out a stage's pending items, merging, and stop.
//!
//! All transition rules live here and in the pure decisions of
//! `reelflow_core::stage`; callers (HTTP handlers, the resume manager)
//! only invoke commands and observe the document.

use std::sync::Arc;

use reelflow_core::document::{
    ItemPatch, WorkflowDocument, WorkflowStatus, STOPPED_BY_USER,
};
use reelflow_core::error::{CoreError, CoreResult};
use reelflow_core::planning::plan_video_items;
use reelflow_core::stage::{evaluate_advance, Stage};
use reelflow_core::types::{DocId, ItemKind};
use reelflow_provider::traits::{GenerationProvider, GenerationRequest, MergeService};
use reelflow_store::{DocumentStore, DocumentUpdater};
use tokio_util::sync::CancellationToken;

use crate::batch::run_unbounded;
use crate::item::{run_item, ItemRunEnv};

/// Shared dependencies for all pipeline operations.
pub struct PipelineDeps {
    pub store: Arc<dyn DocumentStore>,
    pub provider: Arc<dyn GenerationProvider>,
    pub merge: Arc<dyn MergeService>,
    pub updater: DocumentUpdater,
}

impl PipelineDeps {
    fn item_env(&self) -> ItemRunEnv<'_> {
        ItemRunEnv {
            store: self.store.as_ref(),
            provider: self.provider.as_ref(),
            updater: &self.updater,
        }
    }
}

// ---------------------------------------------------------------------------
// Advance
// ---------------------------------------------------------------------------

/// Apply the auto-advance rule if it fires; otherwise return the document
/// unchanged.
///
/// Safe to call redundantly: the decision is re-evaluated against a fresh
/// read inside the CAS mutator, so two racing callers converge on one
/// transition.
pub async fn advance(deps: &PipelineDeps, id: DocId) -> CoreResult<WorkflowDocument> {
    let current = deps.store.read(id).await?.value;
    let Some(decision) = evaluate_advance(&current) else {
        return Ok(current);
    };

    let doc = deps
        .updater
        .update_document(deps.store.as_ref(), id, |doc| {
            if let Some(advance) = evaluate_advance(doc) {
                doc.stage = advance.to;
                doc.status = advance.status;
            }
            Ok(())
        })
        .await?;

    tracing::info!(
        document_id = %id,
        stage = %decision.to,
        status = ?decision.status,
        "Stage advanced",
    );
    Ok(doc)
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Build the generation request for one item from the current document
/// state.
///
/// Scene images are edited against the completed character reference
/// images; a scene stage with zero completed characters degrades to a plain
/// text-driven edit with no references.
pub fn build_request(
    doc: &WorkflowDocument,
    kind: ItemKind,
    index: usize,
) -> CoreResult<GenerationRequest> {
    let out_of_range = |len: usize| {
        CoreError::Validation(format!("{kind} index {index} out of range (len {len})"))
    };
    match kind {
        ItemKind::Character => {
            let item = doc
                .characters
                .get(index)
                .ok_or_else(|| out_of_range(doc.characters.len()))?;
            Ok(GenerationRequest::TextToImage {
                prompt: item.prompt.clone(),
                params: serde_json::Value::Null,
            })
        }
        ItemKind::Scene => {
            let item = doc
                .scenes
                .get(index)
                .ok_or_else(|| out_of_range(doc.scenes.len()))?;
            let ref_urls: Vec<String> = doc
                .characters
                .iter()
                .filter_map(|c| c.output_url.clone())
                .collect();
            Ok(GenerationRequest::ImageToEdit {
                ref_urls,
                prompt: item.image_prompt.clone(),
                params: serde_json::Value::Null,
            })
        }
        ItemKind::Video => {
            let item = doc
                .videos
                .get(index)
                .ok_or_else(|| out_of_range(doc.videos.len()))?;
            Ok(GenerationRequest::ImageToVideo {
                first_frame_url: item.first_frame_url.clone(),
                last_frame_url: item.last_frame_url.clone(),
                prompt: item.prompt.clone(),
                params: serde_json::Value::Null,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Stage execution
// ---------------------------------------------------------------------------

/// Fan out every pending item of the document's current active stage, wait
/// for all of them, then advance.
///
/// Items already terminal or already awaiting a handle are skipped, so a
/// redundant call never double-submits.
pub async fn run_stage(
    deps: &PipelineDeps,
    id: DocId,
    cancel: &CancellationToken,
) -> CoreResult<WorkflowDocument> {
    let doc = deps.store.read(id).await?.value;
    let Some(kind) = doc.stage.active_collection() else {
        return Ok(doc);
    };

    let pending: Vec<usize> = doc
        .items(kind)
        .iter()
        .enumerate()
        .filter(|(_, item)| !item.is_terminal() && !item.is_awaiting())
        .map(|(i, _)| i)
        .collect();

    tracing::info!(
        document_id = %id,
        stage = %doc.stage,
        pending = pending.len(),
        "Running stage batch",
    );

    let env = deps.item_env();
    let results = run_unbounded(pending, |index| {
        let env = &env;
        let doc = &doc;
        async move {
            let request = build_request(doc, kind, index)?;
            run_item(env, id, kind, index, &request, cancel).await
        }
    })
    .await;

    for result in results {
        match result {
            Ok(()) => {}
            Err(CoreError::Cancelled) => {
                tracing::info!(document_id = %id, "Stage batch cancelled");
                return deps.store.read(id).await.map(|v| v.value).map_err(Into::into);
            }
            Err(e) => tracing::error!(document_id = %id, error = %e, "Item pipeline failed"),
        }
    }

    advance(deps, id).await
}

// ---------------------------------------------------------------------------
// Continue
// ---------------------------------------------------------------------------

/// Apply the `continue` transition: `<stage>_done` → next active stage (or
/// merging), `status = running`, materializing the video collection when the
/// video stage is entered.
///
/// Valid only while `status == waiting`. Returns the updated document; the
/// caller is responsible for executing the entered stage.
pub async fn apply_continue(deps: &PipelineDeps, id: DocId) -> CoreResult<WorkflowDocument> {
    let doc = deps
        .updater
        .update_document(deps.store.as_ref(), id, |doc| {
            if doc.status != WorkflowStatus::Waiting {
                return Err(CoreError::Validation(format!(
                    "Cannot continue: workflow status is {:?}, expected waiting",
                    doc.status
                )));
            }
            let next = doc.stage.next_after_done().ok_or_else(|| {
                CoreError::Validation(format!(
                    "Cannot continue from stage {}",
                    doc.stage
                ))
            })?;

            if next == Stage::Videos && doc.videos.is_empty() {
                doc.videos = plan_video_items(&doc.scenes, doc.frame_mode);
            }
            doc.stage = next;
            doc.status = WorkflowStatus::Running;
            Ok(())
        })
        .await?;

    tracing::info!(document_id = %id, stage = %doc.stage, "Workflow continued");
    Ok(doc)
}

/// Execute the stage a `continue` just entered: batch for active stages,
/// merge for the merging stage.
pub async fn run_entered_stage(
    deps: &PipelineDeps,
    id: DocId,
    stage: Stage,
    cancel: &CancellationToken,
) -> CoreResult<WorkflowDocument> {
    if stage == Stage::Merging {
        run_merge(deps, id).await
    } else {
        run_stage(deps, id, cancel).await
    }
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Merge the completed video clips into the final video.
///
/// Merge success with every clip present completes the workflow; success
/// with some failed clips is the irrecoverable `partial` outcome; a merge
/// failure marks the workflow `failed` while keeping the stage at
/// `merging`.
pub async fn run_merge(deps: &PipelineDeps, id: DocId) -> CoreResult<WorkflowDocument> {
    let doc = deps.store.read(id).await?.value;

    let mut clips: Vec<(u32, String)> = doc
        .videos
        .iter()
        .filter_map(|v| v.output_url.clone().map(|url| (v.index, url)))
        .collect();
    clips.sort_by_key(|(index, _)| *index);
    let urls: Vec<String> = clips.into_iter().map(|(_, url)| url).collect();
    let all_succeeded = urls.len() == doc.videos.len();

    match deps.merge.merge(&urls).await {
        Ok(merged_url) => {
            tracing::info!(document_id = %id, clips = urls.len(), "Merge completed");
            deps.updater
                .update_document(deps.store.as_ref(), id, |doc| {
                    doc.merged_video_url = Some(merged_url.clone());
                    doc.stage = Stage::Completed;
                    doc.status = if all_succeeded {
                        WorkflowStatus::Completed
                    } else {
                        WorkflowStatus::Partial
                    };
                    Ok(())
                })
                .await
        }
        Err(e) => {
            tracing::error!(document_id = %id, error = %e, "Merge failed");
            deps.updater
                .update_document(deps.store.as_ref(), id, |doc| {
                    doc.status = WorkflowStatus::Failed;
                    Ok(())
                })
                .await
        }
    }
}

// ---------------------------------------------------------------------------
// Stop
// ---------------------------------------------------------------------------

/// Stop the workflow: status `stopped`, every non-terminal item across all
/// collections errored with "Stopped by user", in one CAS update.
///
/// The caller cancels the document's runtime token separately; in-flight
/// provider calls finish on their own but their results land on items that
/// are already terminal and are discarded by the poller's cancellation
/// check.
pub async fn stop(deps: &PipelineDeps, id: DocId) -> CoreResult<WorkflowDocument> {
    let doc = deps
        .updater
        .update_document(deps.store.as_ref(), id, |doc| {
            doc.status = WorkflowStatus::Stopped;
            doc.fail_all_non_terminal(STOPPED_BY_USER);
            Ok(())
        })
        .await?;
    tracing::info!(document_id = %id, "Workflow stopped");
    Ok(doc)
}

// ---------------------------------------------------------------------------
// Retry bookkeeping
// ---------------------------------------------------------------------------

/// Reset one item for retry: back to `pending`, outcome fields cleared, and
/// optionally a new prompt.
pub fn reset_patch(kind: ItemKind, new_prompt: Option<String>) -> ItemPatch {
    use reelflow_core::document::{
        CharacterPatch, ItemStatus, ScenePatch, VideoPatch, VideoStatus,
    };
    match kind {
        ItemKind::Character => ItemPatch::Character(CharacterPatch {
            prompt: new_prompt,
            status: Some(ItemStatus::Pending),
            output_url: Some(None),
            job_handle: Some(None),
            error: Some(None),
        }),
        ItemKind::Scene => ItemPatch::Scene(ScenePatch {
            image_prompt: new_prompt,
            video_prompt: None,
            image_status: Some(ItemStatus::Pending),
            output_url: Some(None),
            job_handle: Some(None),
            error: Some(None),
        }),
        ItemKind::Video => ItemPatch::Video(VideoPatch {
            prompt: new_prompt,
            status: Some(VideoStatus::Pending),
            output_url: Some(None),
            job_handle: Some(None),
            error: Some(None),
        }),
    }
}

/// A successful video retry makes a failed final stage continueable again.
pub async fn repair_failed_videos_status(
    deps: &PipelineDeps,
    id: DocId,
) -> CoreResult<WorkflowDocument> {
    deps.updater
        .update_document(deps.store.as_ref(), id, |doc| {
            let all_terminal = doc.videos.iter().all(|v| v.status.is_terminal());
            let any_succeeded = doc.videos.iter().any(|v| v.output_url.is_some());
            if doc.status == WorkflowStatus::Failed
                && doc.stage == Stage::VideosDone
                && all_terminal
                && any_succeeded
            {
                doc.status = WorkflowStatus::Waiting;
            }
            Ok(())
        })
        .await
}
