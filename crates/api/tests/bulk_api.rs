//! Integration tests for the bulk image generation endpoint.

mod common;

use axum::http::StatusCode;
use common::{body_json, post_json};
use serde_json::json;

#[tokio::test]
async fn bulk_returns_one_result_per_prompt() {
    let (app, _store) = common::build_test_app();
    let response = post_json(
        app,
        "/api/v1/images/bulk",
        json!({ "prompts": ["a castle", "a forest", "a harbour"] }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let results = json["data"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    for (i, result) in results.iter().enumerate() {
        assert_eq!(result["index"], i);
        assert!(result["output_url"].as_str().unwrap().starts_with("http://img/"));
        assert!(result.get("error").is_none() || result["error"].is_null());
    }
}

#[tokio::test]
async fn bulk_with_no_prompts_is_bad_request() {
    let (app, _store) = common::build_test_app();
    let response = post_json(app, "/api/v1/images/bulk", json!({ "prompts": [] })).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn bulk_with_blank_prompt_is_bad_request() {
    let (app, _store) = common::build_test_app();
    let response = post_json(app, "/api/v1/images/bulk", json!({ "prompts": ["ok", "  "] })).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
