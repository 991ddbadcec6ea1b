//! Route definitions for the `/workflows` resource.

use axum::routing::{get, patch, post};
use axum::Router;

use crate::handlers::workflows;
use crate::state::AppState;

/// Routes mounted at `/workflows`.
///
/// ```text
/// POST   /                              -> create
/// GET    /{id}                          -> get_workflow
/// POST   /{id}/continue                 -> continue_workflow
/// POST   /{id}/stop                     -> stop_workflow
/// PATCH  /{id}/items/{kind}/{index}     -> update_item
/// POST   /{id}/items/{kind}/{index}/retry -> retry_item
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(workflows::create))
        .route("/{id}", get(workflows::get_workflow))
        .route("/{id}/continue", post(workflows::continue_workflow))
        .route("/{id}/stop", post(workflows::stop_workflow))
        .route("/{id}/items/{kind}/{index}", patch(workflows::update_item))
        .route(
            "/{id}/items/{kind}/{index}/retry",
            post(workflows::retry_item),
        )
}
