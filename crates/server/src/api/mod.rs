pub mod progress;

use std::sync::Arc;

use axum::{routing::post, Router};

use crate::engine::ProgressTracker;

/// Routes under `/api`, bound to a shared tracker.
pub fn router(tracker: Arc<ProgressTracker>) -> Router {
    Router::new()
        .route(
            "/api/progress/{user_id}/{video_id}",
            post(progress::save_progress).get(progress::get_progress),
        )
        .with_state(tracker)
}
