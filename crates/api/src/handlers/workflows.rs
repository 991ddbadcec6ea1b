//! Handlers for the `/workflows` resource.
//!
//! Thin wrappers over the orchestrator: parse the path and body, issue the
//! command, wrap the document in the response envelope. All transition rules
//! live in the pipeline crate.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use reelflow_core::document::{
    CharacterPatch, ItemPatch, ScenePatch, VideoPatch, WorkflowDocument,
};
use reelflow_core::progress::{compute_progress, WorkflowProgress};
use reelflow_core::types::{DocId, ItemKind};
use reelflow_pipeline::StartWorkflowInput;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// GET response payload: the document plus a derived progress snapshot.
#[derive(Serialize)]
pub struct WorkflowView {
    pub document: WorkflowDocument,
    pub progress: WorkflowProgress,
}

/// Optional body for the retry endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct RetryBody {
    /// Replacement prompt for the retried item.
    pub prompt: Option<String>,
}

/// POST /api/v1/workflows
///
/// Create a workflow from parsed script input and start generating
/// character images in the background.
pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<StartWorkflowInput>,
) -> AppResult<(StatusCode, Json<DataResponse<WorkflowDocument>>)> {
    let document = state.orchestrator.start_workflow(input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: document })))
}

/// GET /api/v1/workflows/{id}
///
/// Return the document and its progress. Reading also repairs drift: a
/// pending stage advance is applied inline and interrupted items trigger a
/// background resume.
pub async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<DocId>,
) -> AppResult<Json<DataResponse<WorkflowView>>> {
    let document = state.orchestrator.observe_workflow(id).await?;
    let progress = compute_progress(&document);
    Ok(Json(DataResponse {
        data: WorkflowView { document, progress },
    }))
}

/// POST /api/v1/workflows/{id}/continue
///
/// Move a waiting workflow into its next stage. 400 if the workflow is not
/// waiting.
pub async fn continue_workflow(
    State(state): State<AppState>,
    Path(id): Path<DocId>,
) -> AppResult<Json<DataResponse<WorkflowDocument>>> {
    let document = state.orchestrator.continue_workflow(id).await?;
    Ok(Json(DataResponse { data: document }))
}

/// POST /api/v1/workflows/{id}/stop
///
/// Stop the workflow and error out every non-terminal item.
pub async fn stop_workflow(
    State(state): State<AppState>,
    Path(id): Path<DocId>,
) -> AppResult<Json<DataResponse<WorkflowDocument>>> {
    let document = state.orchestrator.stop_workflow(id).await?;
    Ok(Json(DataResponse { data: document }))
}

/// POST /api/v1/workflows/{id}/items/{kind}/{index}/retry
///
/// Reset one item and re-run its generation pipeline, optionally with a new
/// prompt.
pub async fn retry_item(
    State(state): State<AppState>,
    Path((id, kind, index)): Path<(DocId, String, usize)>,
    body: Option<Json<RetryBody>>,
) -> AppResult<Json<DataResponse<WorkflowDocument>>> {
    let kind = parse_kind(&kind)?;
    let prompt = body.and_then(|Json(body)| body.prompt);
    let document = state.orchestrator.retry_item(id, kind, index, prompt).await?;
    Ok(Json(DataResponse { data: document }))
}

/// PATCH /api/v1/workflows/{id}/items/{kind}/{index}
///
/// Apply a partial patch to one item (prompt edits and the like). The body
/// shape depends on the item kind in the path.
pub async fn update_item(
    State(state): State<AppState>,
    Path((id, kind, index)): Path<(DocId, String, usize)>,
    Json(body): Json<serde_json::Value>,
) -> AppResult<Json<DataResponse<WorkflowDocument>>> {
    let kind = parse_kind(&kind)?;
    let patch = parse_patch(kind, body)?;
    let document = state.orchestrator.update_item(id, index, &patch).await?;
    Ok(Json(DataResponse { data: document }))
}

fn parse_kind(kind: &str) -> Result<ItemKind, AppError> {
    ItemKind::parse(kind)
        .ok_or_else(|| AppError::BadRequest(format!("Unknown item kind '{kind}'")))
}

fn parse_patch(kind: ItemKind, body: serde_json::Value) -> Result<ItemPatch, AppError> {
    let bad = |e: serde_json::Error| AppError::BadRequest(format!("Invalid {kind} patch: {e}"));
    Ok(match kind {
        ItemKind::Character => {
            ItemPatch::Character(serde_json::from_value::<CharacterPatch>(body).map_err(bad)?)
        }
        ItemKind::Scene => {
            ItemPatch::Scene(serde_json::from_value::<ScenePatch>(body).map_err(bad)?)
        }
        ItemKind::Video => {
            ItemPatch::Video(serde_json::from_value::<VideoPatch>(body).map_err(bad)?)
        }
    })
}
