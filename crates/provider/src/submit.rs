//! Task submission: one generation request in, an outcome or a
//! [`CoreError::Submission`] out.

use reelflow_core::error::CoreError;

use crate::traits::{GenerationProvider, GenerationRequest, SubmitOutcome};

/// Submit one work item's generation request.
///
/// The provider either returns output synchronously (the caller marks the
/// item done immediately) or an opaque job handle (the caller must persist
/// the handle before polling, so a crash after submission is resumable).
/// A rejected or malformed submission surfaces as `CoreError::Submission`;
/// the caller records it on the item and continues with siblings.
pub async fn submit_task(
    provider: &dyn GenerationProvider,
    request: &GenerationRequest,
) -> Result<SubmitOutcome, CoreError> {
    match request {
        GenerationRequest::TextToImage { prompt, params } => {
            provider.text_to_image(prompt, params).await
        }
        GenerationRequest::ImageToEdit {
            ref_urls,
            prompt,
            params,
        } => provider.image_to_edit(ref_urls, prompt, params).await,
        GenerationRequest::ImageToVideo {
            first_frame_url,
            last_frame_url,
            prompt,
            params,
        } => {
            provider
                .image_to_video(first_frame_url, last_frame_url.as_deref(), prompt, params)
                .await
        }
    }
}
