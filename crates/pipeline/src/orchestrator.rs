//! The server-owned orchestrator facade.
//!
//! One instance per process owns the store, the provider clients, and the
//! per-document runtime registry. Commands validate and apply the document
//! transition synchronously, then spawn the long-running generation work on
//! the runtime; callers observe progress by re-reading the document.

use std::sync::Arc;

use reelflow_core::document::{FrameMode, ItemPatch, WorkflowDocument, WorkflowStatus};
use reelflow_core::error::CoreResult;
use reelflow_core::planning::{seed_document, ScriptInput};
use reelflow_core::progress::{compute_progress, WorkflowProgress};
use reelflow_core::stage::Stage;
use reelflow_core::types::{new_doc_id, DocId, ItemKind};
use reelflow_provider::traits::{GenerationProvider, MergeService};
use reelflow_store::{DocumentStore, DocumentUpdater};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::bulk::{bulk_generate, BulkItemResult};
use crate::context::RuntimeRegistry;
use crate::controller::{
    advance, apply_continue, build_request, repair_failed_videos_status, reset_patch,
    run_entered_stage, run_stage, stop, PipelineDeps,
};
use crate::item::{run_item, ItemRunEnv};
use crate::resume::resume_document;

/// Input for starting a new workflow from parsed script data.
#[derive(Debug, Clone, Deserialize)]
pub struct StartWorkflowInput {
    pub title: String,
    pub script: ScriptInput,
    #[serde(default)]
    pub frame_mode: FrameMode,
}

struct Inner {
    deps: PipelineDeps,
    registry: RuntimeRegistry,
}

/// The single entry point for workflow commands and queries.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        provider: Arc<dyn GenerationProvider>,
        merge: Arc<dyn MergeService>,
    ) -> Self {
        Self::with_updater(store, provider, merge, DocumentUpdater::default())
    }

    /// Construct with a custom update retry policy (shorter delays in tests).
    pub fn with_updater(
        store: Arc<dyn DocumentStore>,
        provider: Arc<dyn GenerationProvider>,
        merge: Arc<dyn MergeService>,
        updater: DocumentUpdater,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                deps: PipelineDeps {
                    store,
                    provider,
                    merge,
                    updater,
                },
                registry: RuntimeRegistry::new(),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Create a workflow from parsed script input and, when the script
    /// declares characters, start generating them in the background.
    pub async fn start_workflow(&self, input: StartWorkflowInput) -> CoreResult<WorkflowDocument> {
        let doc = seed_document(new_doc_id(), input.title, &input.script, input.frame_mode)?;
        self.inner.deps.store.insert(&doc).await?;
        tracing::info!(document_id = %doc.id, stage = %doc.stage, "Workflow created");

        if doc.stage == Stage::Characters {
            self.spawn_stage(doc.id);
        }
        Ok(doc)
    }

    /// Advance a waiting workflow into its next stage and start generating.
    ///
    /// Returns the document as of the transition; the entered stage runs in
    /// the background.
    pub async fn continue_workflow(&self, id: DocId) -> CoreResult<WorkflowDocument> {
        let doc = apply_continue(&self.inner.deps, id).await?;
        let entered = doc.stage;

        let inner = Arc::clone(&self.inner);
        let runtime = self.inner.registry.runtime(id);
        tokio::spawn(async move {
            let _op = runtime.begin_op();
            let cancel = runtime.renewed_token();
            if let Err(e) = run_entered_stage(&inner.deps, id, entered, &cancel).await {
                tracing::error!(document_id = %id, error = %e, "Stage execution failed");
            }
        });
        Ok(doc)
    }

    /// Stop a workflow: cancel the in-flight runtime and error every
    /// non-terminal item.
    pub async fn stop_workflow(&self, id: DocId) -> CoreResult<WorkflowDocument> {
        self.inner.registry.runtime(id).cancel_all();
        stop(&self.inner.deps, id).await
    }

    /// Reset one item and re-run its submit+poll pipeline, optionally with a
    /// replacement prompt.
    pub async fn retry_item(
        &self,
        id: DocId,
        kind: ItemKind,
        index: usize,
        new_prompt: Option<String>,
    ) -> CoreResult<WorkflowDocument> {
        let doc = self
            .inner
            .deps
            .updater
            .apply_item_patch(
                self.inner.deps.store.as_ref(),
                id,
                index,
                &reset_patch(kind, new_prompt),
            )
            .await?;
        tracing::info!(document_id = %id, kind = %kind, index, "Item retry requested");

        let inner = Arc::clone(&self.inner);
        let runtime = self.inner.registry.runtime(id);
        tokio::spawn(async move {
            let _op = runtime.begin_op();
            let cancel = runtime.renewed_token();
            if let Err(e) = retry_pipeline(&inner.deps, id, kind, index, &cancel).await {
                tracing::error!(document_id = %id, kind = %kind, index, error = %e, "Item retry failed");
            }
        });
        Ok(doc)
    }

    /// Re-attach to interrupted work after a restart.
    pub async fn resume_workflow(&self, id: DocId) -> CoreResult<WorkflowDocument> {
        let runtime = self.inner.registry.runtime(id);
        resume_document(&self.inner.deps, &runtime, id).await
    }

    /// Read a document and repair drift on the way: apply a pending advance
    /// inline, and kick off a background resume when interrupted items exist
    /// with no pipeline attending to them.
    pub async fn observe_workflow(&self, id: DocId) -> CoreResult<WorkflowDocument> {
        let doc = advance(&self.inner.deps, id).await?;

        let runtime = self.inner.registry.runtime(id);
        let needs_resume = !crate::resume::find_resumable(&doc).is_empty()
            || crate::resume::count_stuck(&doc) > 0;
        if doc.status == WorkflowStatus::Running && needs_resume && runtime.active_ops() == 0 {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                if let Err(e) = resume_document(&inner.deps, &runtime, id).await {
                    tracing::error!(document_id = %id, error = %e, "Background resume failed");
                }
            });
        }
        Ok(doc)
    }

    /// Apply a caller-supplied partial patch to one item (prompt edits and
    /// the like).
    pub async fn update_item(
        &self,
        id: DocId,
        index: usize,
        patch: &ItemPatch,
    ) -> CoreResult<WorkflowDocument> {
        self.inner
            .deps
            .updater
            .apply_item_patch(self.inner.deps.store.as_ref(), id, index, patch)
            .await
    }

    /// Generate a flat batch of images with capped concurrency; no document
    /// is involved.
    pub async fn bulk_images(&self, prompts: Vec<String>) -> Vec<BulkItemResult> {
        let cancel = CancellationToken::new();
        bulk_generate(self.inner.deps.provider.as_ref(), prompts, &cancel).await
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub async fn get_workflow(&self, id: DocId) -> CoreResult<WorkflowDocument> {
        Ok(self.inner.deps.store.read(id).await?.value)
    }

    pub async fn get_progress(&self, id: DocId) -> CoreResult<WorkflowProgress> {
        let doc = self.get_workflow(id).await?;
        Ok(compute_progress(&doc))
    }

    /// Number of pipelines currently in flight for a document.
    pub fn active_ops(&self, id: DocId) -> usize {
        self.inner.registry.runtime(id).active_ops()
    }

    // -----------------------------------------------------------------------

    fn spawn_stage(&self, id: DocId) {
        let inner = Arc::clone(&self.inner);
        let runtime = self.inner.registry.runtime(id);
        tokio::spawn(async move {
            let _op = runtime.begin_op();
            let cancel = runtime.renewed_token();
            if let Err(e) = run_stage(&inner.deps, id, &cancel).await {
                tracing::error!(document_id = %id, error = %e, "Stage execution failed");
            }
        });
    }
}

/// The single-item retry pipeline: re-run the item, then re-evaluate stage
/// state, including un-failing a video stage that now has a success.
async fn retry_pipeline(
    deps: &PipelineDeps,
    id: DocId,
    kind: ItemKind,
    index: usize,
    cancel: &CancellationToken,
) -> CoreResult<()> {
    let doc = deps.store.read(id).await?.value;
    let request = build_request(&doc, kind, index)?;
    let env = ItemRunEnv {
        store: deps.store.as_ref(),
        provider: deps.provider.as_ref(),
        updater: &deps.updater,
    };
    run_item(&env, id, kind, index, &request, cancel).await?;

    advance(deps, id).await?;
    if kind == ItemKind::Video {
        repair_failed_videos_status(deps, id).await?;
    }
    Ok(())
}
