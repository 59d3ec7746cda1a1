use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handler;
use crate::state::AppState;

/// Build the axum router with all MGit endpoints.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_body_bytes;
    Router::new()
        .route("/v1/health", get(handler::health_handler))
        .route("/v1/info", get(handler::info_handler))
        .route("/v1/repos/:repo/refs", post(handler::list_refs_handler))
        .route("/v1/repos/:repo/refs/update", post(handler::ref_update_handler))
        .route("/v1/repos/:repo/objects/has", post(handler::has_handler))
        .route("/v1/repos/:repo/objects/fetch", post(handler::fetch_handler))
        .route("/v1/repos/:repo/objects/push", post(handler::push_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
