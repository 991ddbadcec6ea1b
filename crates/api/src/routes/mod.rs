pub mod health;
pub mod images;
pub mod workflows;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /health                                          liveness probe
///
/// /workflows                                       create (POST)
/// /workflows/{id}                                  get (GET)
/// /workflows/{id}/continue                         continue (POST)
/// /workflows/{id}/stop                             stop (POST)
/// /workflows/{id}/items/{kind}/{index}             update item (PATCH)
/// /workflows/{id}/items/{kind}/{index}/retry       retry item (POST)
///
/// /images/bulk                                     bulk generation (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .nest("/workflows", workflows::router())
        .nest("/images", images::router())
}
