//! Handlers for the `/images` resource: flat bulk generation outside the
//! staged workflow.

use axum::extract::State;
use axum::Json;
use reelflow_pipeline::BulkItemResult;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Body for the bulk image generation endpoint.
#[derive(Debug, Deserialize)]
pub struct BulkImagesBody {
    pub prompts: Vec<String>,
}

/// POST /api/v1/images/bulk
///
/// Generate a batch of images with capped concurrency. The response carries
/// one slot per prompt, in input order, each with either an output url or an
/// error message.
pub async fn bulk_images(
    State(state): State<AppState>,
    Json(body): Json<BulkImagesBody>,
) -> AppResult<Json<DataResponse<Vec<BulkItemResult>>>> {
    if body.prompts.is_empty() {
        return Err(AppError::BadRequest("prompts must not be empty".into()));
    }
    if body.prompts.iter().any(|p| p.trim().is_empty()) {
        return Err(AppError::BadRequest("prompts must not be blank".into()));
    }

    let results = state.orchestrator.bulk_images(body.prompts).await;
    Ok(Json(DataResponse { data: results }))
}
