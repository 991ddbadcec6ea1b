//! Flat bulk image generation, outside the staged workflow.
//!
//! A one-shot batch of text-to-image prompts with no document behind it:
//! nothing is persisted, the caller gets per-prompt outcomes back. Runs in
//! sequential groups of [`BULK_BATCH_SIZE`] so a large request cannot flood
//! the provider.

use reelflow_core::document::STOPPED_BY_USER;
use reelflow_core::error::CoreError;
use reelflow_provider::poll::{poll_job, IMAGE_POLL};
use reelflow_provider::traits::{GenerationProvider, SubmitOutcome};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::batch::{run_capped, BULK_BATCH_SIZE};

/// Outcome for one prompt of a bulk request, in input order.
#[derive(Debug, Clone, Serialize)]
pub struct BulkItemResult {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BulkItemResult {
    fn done(index: usize, output_url: String) -> Self {
        Self {
            index,
            output_url: Some(output_url),
            error: None,
        }
    }

    fn failed(index: usize, error: String) -> Self {
        Self {
            index,
            output_url: None,
            error: Some(error),
        }
    }
}

async fn generate_one(
    provider: &dyn GenerationProvider,
    index: usize,
    prompt: String,
    cancel: &CancellationToken,
) -> BulkItemResult {
    let outcome = match provider.text_to_image(&prompt, &serde_json::Value::Null).await {
        Ok(outcome) => outcome,
        Err(e) => return BulkItemResult::failed(index, e.to_string()),
    };
    match outcome {
        SubmitOutcome::Completed { output_url } => BulkItemResult::done(index, output_url),
        SubmitOutcome::Queued { job_handle } => {
            match poll_job(provider, &job_handle, IMAGE_POLL, || !cancel.is_cancelled()).await {
                Ok(output_url) => BulkItemResult::done(index, output_url),
                Err(CoreError::Cancelled) => {
                    BulkItemResult::failed(index, STOPPED_BY_USER.to_string())
                }
                Err(e) => BulkItemResult::failed(index, e.to_string()),
            }
        }
    }
}

/// Generate a batch of images, at most [`BULK_BATCH_SIZE`] in flight at
/// once. Per-prompt failures land in the corresponding slot; prompts whose
/// group never started after a cancellation are reported as stopped.
pub async fn bulk_generate(
    provider: &dyn GenerationProvider,
    prompts: Vec<String>,
    cancel: &CancellationToken,
) -> Vec<BulkItemResult> {
    let total = prompts.len();
    tracing::info!(total, "Bulk image generation started");

    let indexed: Vec<(usize, String)> = prompts.into_iter().enumerate().collect();
    let results = run_capped(indexed, BULK_BATCH_SIZE, cancel, |(index, prompt)| async move {
        generate_one(provider, index, prompt, cancel).await
    })
    .await;

    results
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.unwrap_or_else(|| BulkItemResult::failed(index, STOPPED_BY_USER.to_string()))
        })
        .collect()
}
