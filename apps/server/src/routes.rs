use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/transcripts/process", post(handlers::process_transcript))
        .route("/transcripts/batch", post(handlers::process_batch))
        .route("/jobs/:id", get(handlers::get_job))
        .route("/jobs/:id/result", get(handlers::get_job_result))
        .route("/jobs/:id/cancel", post(handlers::cancel_job))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
