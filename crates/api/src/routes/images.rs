//! Route definitions for the `/images` resource.

use axum::routing::post;
use axum::Router;

use crate::handlers::images;
use crate::state::AppState;

/// Routes mounted at `/images`.
pub fn router() -> Router<AppState> {
    Router::new().route("/bulk", post(images::bulk_images))
}
