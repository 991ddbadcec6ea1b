//! Shared fixtures for API integration tests: an in-memory store, mock
//! provider clients, and request helpers over `tower::ServiceExt::oneshot`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use reelflow_core::error::{CoreError, CoreResult};
use reelflow_pipeline::Orchestrator;
use reelflow_provider::traits::{
    GenerationParams, GenerationProvider, JobResult, MergeService, SubmitOutcome,
};
use reelflow_store::{DocumentStore, MemoryStore};
use tower::ServiceExt;

use reelflow_api::config::ServerConfig;
use reelflow_api::router::build_app_router;
use reelflow_api::state::AppState;

/// Provider that completes every submission inline.
pub struct InlineProvider {
    pub submissions: AtomicUsize,
}

impl InlineProvider {
    fn submit(&self) -> CoreResult<SubmitOutcome> {
        let n = self.submissions.fetch_add(1, Ordering::SeqCst);
        Ok(SubmitOutcome::Completed {
            output_url: format!("http://img/{n}"),
        })
    }
}

#[async_trait]
impl GenerationProvider for InlineProvider {
    async fn text_to_image(
        &self,
        _prompt: &str,
        _params: &GenerationParams,
    ) -> CoreResult<SubmitOutcome> {
        self.submit()
    }

    async fn image_to_edit(
        &self,
        _ref_urls: &[String],
        _prompt: &str,
        _params: &GenerationParams,
    ) -> CoreResult<SubmitOutcome> {
        self.submit()
    }

    async fn image_to_video(
        &self,
        _first_frame_url: &str,
        _last_frame_url: Option<&str>,
        _prompt: &str,
        _params: &GenerationParams,
    ) -> CoreResult<SubmitOutcome> {
        self.submit()
    }

    async fn get_job_result(&self, _job_handle: &str) -> CoreResult<JobResult> {
        Err(CoreError::Provider("inline provider never polls".into()))
    }
}

pub struct StubMerge;

#[async_trait]
impl MergeService for StubMerge {
    async fn merge(&self, output_urls: &[String]) -> CoreResult<String> {
        Ok(format!("http://final/merged-{}.mp4", output_urls.len()))
    }
}

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        provider_base_url: "http://localhost:8188".to_string(),
        merge_base_url: "http://localhost:8188".to_string(),
    }
}

/// Build the full application router over an in-memory store and inline
/// mock provider, with the same middleware stack as production.
pub fn build_test_app() -> (Router, Arc<MemoryStore>) {
    let config = test_config();
    let store = Arc::new(MemoryStore::new());
    let orchestrator = Orchestrator::new(
        Arc::clone(&store) as Arc<dyn DocumentStore>,
        Arc::new(InlineProvider {
            submissions: AtomicUsize::new(0),
        }),
        Arc::new(StubMerge),
    );
    let state = AppState {
        orchestrator,
        config: Arc::new(config.clone()),
    };
    (build_app_router(state, &config), store)
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    request_json(app, Method::POST, uri, body).await
}

pub async fn patch_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    request_json(app, Method::PATCH, uri, body).await
}

async fn request_json(
    app: Router,
    method: Method,
    uri: &str,
    body: serde_json::Value,
) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

/// Collect a response body as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Repeatedly GET the workflow until `pred` holds for the `data` payload.
pub async fn wait_for_workflow<F>(app: &Router, id: &str, what: &str, pred: F) -> serde_json::Value
where
    F: Fn(&serde_json::Value) -> bool,
{
    for _ in 0..500 {
        let response = get(app.clone(), &format!("/api/v1/workflows/{id}")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        if pred(&json["data"]) {
            return json["data"].clone();
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}
