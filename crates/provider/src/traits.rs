//! Collaborator contracts consumed by the orchestration core.

use serde::{Deserialize, Serialize};

use reelflow_core::error::CoreError;

/// Extra generation parameters forwarded verbatim to the provider.
pub type GenerationParams = serde_json::Value;

/// One generation request, shaped by what the stage needs.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GenerationRequest {
    /// Character reference image from a text prompt.
    TextToImage {
        prompt: String,
        #[serde(skip_serializing_if = "serde_json::Value::is_null")]
        params: GenerationParams,
    },
    /// Scene image edited against character reference images.
    ImageToEdit {
        ref_urls: Vec<String>,
        prompt: String,
        #[serde(skip_serializing_if = "serde_json::Value::is_null")]
        params: GenerationParams,
    },
    /// Video clip from one or two boundary frames.
    ImageToVideo {
        first_frame_url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        last_frame_url: Option<String>,
        prompt: String,
        #[serde(skip_serializing_if = "serde_json::Value::is_null")]
        params: GenerationParams,
    },
}

/// What a provider returned for a submission: an inline result or a handle
/// to poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The provider produced output synchronously.
    Completed { output_url: String },
    /// The provider queued an asynchronous job.
    Queued { job_handle: String },
}

/// Provider-reported state of an asynchronous job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Succeeded,
    Completed,
    Failed,
    Error,
    #[serde(other)]
    Unknown,
}

impl JobState {
    pub fn is_success(&self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Completed)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, JobState::Failed | JobState::Error)
    }
}

/// One poll observation for a job handle.
#[derive(Debug, Clone, Deserialize)]
pub struct JobResult {
    pub status: JobState,
    #[serde(default)]
    pub output_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// A generation provider: three submission shapes and a job-status query.
///
/// Submissions are at-least-once; the core avoids duplicate submission on
/// resume but does not guarantee it under truly concurrent resumes.
#[async_trait::async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn text_to_image(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<SubmitOutcome, CoreError>;

    async fn image_to_edit(
        &self,
        ref_urls: &[String],
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<SubmitOutcome, CoreError>;

    async fn image_to_video(
        &self,
        first_frame_url: &str,
        last_frame_url: Option<&str>,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<SubmitOutcome, CoreError>;

    async fn get_job_result(&self, job_handle: &str) -> Result<JobResult, CoreError>;
}

/// Merges the ordered video outputs into a single final video.
#[async_trait::async_trait]
pub trait MergeService: Send + Sync {
    async fn merge(&self, output_urls: &[String]) -> Result<String, CoreError>;
}
