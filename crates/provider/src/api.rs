//! REST client for the generation provider's HTTP endpoints.
//!
//! Wraps the provider HTTP API (submission per request shape, job status
//! lookup) using [`reqwest`]. The provider either answers a submission with
//! an inline `output_url` or with a `job_handle` to poll.

use serde::Deserialize;

use reelflow_core::error::CoreError;

use crate::traits::{
    GenerationParams, GenerationProvider, JobResult, SubmitOutcome,
};

/// HTTP client for one generation provider.
pub struct GenerationApi {
    client: reqwest::Client,
    base_url: String,
}

/// Response returned by the provider's submission endpoints.
///
/// Exactly one of the two fields is expected; a response with neither is
/// malformed and treated as a submission error.
#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    output_url: Option<String>,
    #[serde(default)]
    job_handle: Option<String>,
}

/// Errors from the provider REST layer.
#[derive(Debug, thiserror::Error)]
pub enum ProviderApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider returned a non-2xx status code.
    #[error("Provider API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// A 2xx response whose body does not match the expected shape.
    #[error("Malformed provider response: {0}")]
    Malformed(String),
}

impl GenerationApi {
    /// Create a new API client.
    ///
    /// * `base_url` - Base HTTP URL, e.g. `http://host:8080`.
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    /// Create an API client reusing an existing [`reqwest::Client`]
    /// (connection pooling across services).
    pub fn with_client(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    async fn submit(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<SubmitOutcome, ProviderApiError> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(&body)
            .send()
            .await?;

        let parsed: SubmitResponse = Self::parse_response(response).await?;
        match (parsed.output_url, parsed.job_handle) {
            (Some(output_url), _) => Ok(SubmitOutcome::Completed { output_url }),
            (None, Some(job_handle)) => Ok(SubmitOutcome::Queued { job_handle }),
            (None, None) => Err(ProviderApiError::Malformed(
                "submission response carries neither output_url nor job_handle".to_string(),
            )),
        }
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the response
    /// unchanged on success, or a [`ProviderApiError::Api`] containing the
    /// status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ProviderApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ProviderApiError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ProviderApiError> {
        let response = Self::ensure_success(response).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ProviderApiError::Malformed(e.to_string()))
    }
}

impl From<ProviderApiError> for CoreError {
    fn from(err: ProviderApiError) -> Self {
        CoreError::Submission(err.to_string())
    }
}

#[async_trait::async_trait]
impl GenerationProvider for GenerationApi {
    async fn text_to_image(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<SubmitOutcome, CoreError> {
        let body = serde_json::json!({
            "prompt": prompt,
            "params": params,
        });
        Ok(self.submit("/v1/images/generations", body).await?)
    }

    async fn image_to_edit(
        &self,
        ref_urls: &[String],
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<SubmitOutcome, CoreError> {
        let body = serde_json::json!({
            "ref_urls": ref_urls,
            "prompt": prompt,
            "params": params,
        });
        Ok(self.submit("/v1/images/edits", body).await?)
    }

    async fn image_to_video(
        &self,
        first_frame_url: &str,
        last_frame_url: Option<&str>,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<SubmitOutcome, CoreError> {
        let body = serde_json::json!({
            "first_frame_url": first_frame_url,
            "last_frame_url": last_frame_url,
            "prompt": prompt,
            "params": params,
        });
        Ok(self.submit("/v1/videos/generations", body).await?)
    }

    /// Query job status.
    ///
    /// Errors here are surfaced as [`CoreError::Provider`] rather than
    /// `Submission`; the poller treats transient failures as a consumed
    /// attempt, not a terminal error.
    async fn get_job_result(&self, job_handle: &str) -> Result<JobResult, CoreError> {
        let response = self
            .client
            .get(format!("{}/v1/jobs/{job_handle}", self.base_url))
            .send()
            .await
            .map_err(|e| CoreError::Provider(e.to_string()))?;

        let result: JobResult = Self::parse_response(response)
            .await
            .map_err(|e| CoreError::Provider(e.to_string()))?;
        Ok(result)
    }
}
