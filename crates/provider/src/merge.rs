//! REST client for the video merge service.
//!
//! The merge algorithm itself is an opaque service call: the core sends the
//! ordered clip urls and receives the merged video url.

use serde::Deserialize;

use reelflow_core::error::CoreError;

use crate::traits::MergeService;

/// HTTP client for the merge service.
pub struct MergeApi {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct MergeResponse {
    merged_url: String,
}

impl MergeApi {
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    pub fn with_client(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[async_trait::async_trait]
impl MergeService for MergeApi {
    async fn merge(&self, output_urls: &[String]) -> Result<String, CoreError> {
        if output_urls.is_empty() {
            return Err(CoreError::Validation(
                "Merge requires at least one clip url".to_string(),
            ));
        }

        let body = serde_json::json!({ "urls": output_urls });
        let response = self
            .client
            .post(format!("{}/v1/merge", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::Provider(format!("Merge request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(CoreError::Provider(format!(
                "Merge service error ({status}): {body}"
            )));
        }

        let parsed: MergeResponse = response
            .json()
            .await
            .map_err(|e| CoreError::Provider(format!("Malformed merge response: {e}")))?;
        Ok(parsed.merged_url)
    }
}
