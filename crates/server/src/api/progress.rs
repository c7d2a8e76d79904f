// Progress endpoints: report a watched segment, read back completion.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::debug;
use watchtrack_common::protocol::progress::{
    ProgressResponse, SaveProgressRequest, SaveProgressResponse,
};
use watchtrack_common::types::WatchKey;

use crate::engine::{ProgressTracker, TrackerError};
use crate::error::ApiError;
use crate::validation::ValidatedJson;

fn watch_key(user_id: String, video_id: String) -> Result<WatchKey, ApiError> {
    WatchKey::new(user_id, video_id).map_err(|error| TrackerError::Validation(error).into())
}

pub(crate) async fn save_progress(
    State(tracker): State<Arc<ProgressTracker>>,
    Path((user_id, video_id)): Path<(String, String)>,
    ValidatedJson(payload): ValidatedJson<SaveProgressRequest>,
) -> Result<Json<SaveProgressResponse>, ApiError> {
    let key = watch_key(user_id, video_id)?;
    let outcome = tracker.ingest_request(&key, &payload).await?;

    debug!(
        key = %key,
        revision = outcome.revision,
        watched_seconds = outcome.watched_seconds,
        "progress saved"
    );

    Ok(Json(SaveProgressResponse {
        progress: outcome.percent_watched,
        last_position: outcome.last_position,
    }))
}

pub(crate) async fn get_progress(
    State(tracker): State<Arc<ProgressTracker>>,
    Path((user_id, video_id)): Path<(String, String)>,
) -> Result<Json<ProgressResponse>, ApiError> {
    let key = watch_key(user_id, video_id)?;
    let snapshot = tracker.query(&key).await?;
    Ok(Json(snapshot.into()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request, StatusCode},
        Router,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::api::router;
    use crate::engine::{ProgressTracker, TrackerConfig};
    use crate::store::WatchStore;

    fn app() -> Router {
        router(Arc::new(ProgressTracker::new(WatchStore::memory(), TrackerConfig::default())))
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(body) => {
                builder = builder.header("content-type", "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .clone()
            .oneshot(builder.body(body).expect("request should build"))
            .await
            .expect("request should return a response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body should read");
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn report(start: f64, end: f64, current_time: f64, video_duration: f64) -> Option<Value> {
        Some(json!({
            "start": start,
            "end": end,
            "currentTime": current_time,
            "videoDuration": video_duration,
        }))
    }

    #[tokio::test]
    async fn post_then_get_reports_progress() {
        let app = app();
        let uri = "/api/progress/user123/lecture1";

        let (status, body) = send(&app, Method::POST, uri, report(0.0, 30.0, 30.0, 120.0)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "progress": 25.0, "lastPosition": 30.0 }));

        let (status, body) = send(&app, Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "progress": 25.0, "lastPosition": 30.0, "totalDuration": 120.0 }));
    }

    #[tokio::test]
    async fn get_without_history_returns_zeros() {
        let (status, body) = send(&app(), Method::GET, "/api/progress/nobody/nothing", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "progress": 0.0, "lastPosition": 0.0, "totalDuration": 0.0 }));
    }

    #[tokio::test]
    async fn inverted_segment_is_rejected() {
        let (status, body) = send(
            &app(),
            Method::POST,
            "/api/progress/user123/lecture1",
            report(20.0, 10.0, 20.0, 100.0),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_FAILED");
        assert_eq!(body["error"]["details"]["field"], "end");
    }

    #[tokio::test]
    async fn missing_duration_is_rejected() {
        let (status, body) = send(
            &app(),
            Method::POST,
            "/api/progress/user123/lecture1",
            Some(json!({ "start": 0.0, "end": 10.0, "currentTime": 10.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["details"]["kind"], "data_error");
    }

    #[tokio::test]
    async fn blank_user_id_is_rejected() {
        let (status, body) = send(
            &app(),
            Method::POST,
            "/api/progress/%20/lecture1",
            report(0.0, 10.0, 10.0, 100.0),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["details"]["field"], "userId");
    }

    #[tokio::test]
    async fn short_segment_still_moves_playhead() {
        let app = app();
        let uri = "/api/progress/user123/lecture1";

        send(&app, Method::POST, uri, report(0.0, 10.0, 10.0, 100.0)).await;
        let (status, body) = send(&app, Method::POST, uri, report(50.0, 50.4, 50.4, 100.0)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "progress": 10.0, "lastPosition": 50.4 }));
    }

    #[tokio::test]
    async fn keys_are_isolated() {
        let app = app();
        send(&app, Method::POST, "/api/progress/alice/lecture1", report(0.0, 50.0, 50.0, 100.0))
            .await;

        let (_, body) = send(&app, Method::GET, "/api/progress/bob/lecture1", None).await;
        assert_eq!(body["progress"], 0.0);
        let (_, body) = send(&app, Method::GET, "/api/progress/alice/lecture2", None).await;
        assert_eq!(body["progress"], 0.0);
    }
}
