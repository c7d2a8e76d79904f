// Request body validation.
//
// `ValidatedJson<T>` turns axum's plain-text JSON rejections into the
// structured VALIDATION_FAILED envelope.

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;

use crate::error::{ApiError, ErrorCode};

/// Maximum REST request body in bytes (1 MiB).
pub const MAX_REST_BODY_BYTES: usize = 1024 * 1024;

pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ValidatedJson(value)),
            Err(rejection) => {
                let (code, message, details) = classify_json_rejection(&rejection);
                Err(ApiError::new(code, message).with_details(details).into_response())
            }
        }
    }
}

fn classify_json_rejection(rejection: &JsonRejection) -> (ErrorCode, String, serde_json::Value) {
    match rejection {
        JsonRejection::JsonDataError(e) => (
            ErrorCode::ValidationFailed,
            format!("invalid JSON payload: {}", e.body_text()),
            serde_json::json!({ "kind": "data_error" }),
        ),
        JsonRejection::JsonSyntaxError(e) => (
            ErrorCode::ValidationFailed,
            format!("malformed JSON: {}", e.body_text()),
            serde_json::json!({ "kind": "syntax_error" }),
        ),
        JsonRejection::MissingJsonContentType(_) => (
            ErrorCode::ValidationFailed,
            "expected Content-Type: application/json".to_string(),
            serde_json::json!({ "kind": "missing_content_type" }),
        ),
        JsonRejection::BytesRejection(e) if e.status() == axum::http::StatusCode::PAYLOAD_TOO_LARGE => (
            ErrorCode::PayloadTooLarge,
            format!("request body exceeds {MAX_REST_BODY_BYTES} bytes"),
            serde_json::json!({ "kind": "body_too_large" }),
        ),
        other => (
            ErrorCode::ValidationFailed,
            format!("request body error: {other}"),
            serde_json::json!({ "kind": "body_error" }),
        ),
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        routing::post,
        Router,
    };
    use serde::Deserialize;
    use tower::ServiceExt;

    use super::ValidatedJson;

    #[derive(Deserialize)]
    struct Payload {
        start: f64,
    }

    async fn echo(ValidatedJson(payload): ValidatedJson<Payload>) -> String {
        payload.start.to_string()
    }

    fn app() -> Router {
        Router::new().route("/echo", post(echo))
    }

    async fn post_raw(content_type: Option<&str>, body: &'static str) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method("POST").uri("/echo");
        if let Some(content_type) = content_type {
            builder = builder.header("content-type", content_type);
        }
        let response = app()
            .oneshot(builder.body(Body::from(body)).expect("request should build"))
            .await
            .expect("request should return a response");
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body should read");
        (status, serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null))
    }

    #[tokio::test]
    async fn malformed_json_is_a_validation_error() {
        let (status, body) = post_raw(Some("application/json"), "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_FAILED");
        assert_eq!(body["error"]["details"]["kind"], "syntax_error");
    }

    #[tokio::test]
    async fn missing_field_is_a_data_error() {
        let (status, body) = post_raw(Some("application/json"), "{}").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["details"]["kind"], "data_error");
    }

    #[tokio::test]
    async fn missing_content_type_is_rejected() {
        let (status, body) = post_raw(None, r#"{"start": 1.0}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["details"]["kind"], "missing_content_type");
    }

    #[tokio::test]
    async fn valid_body_reaches_handler() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/echo")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"start": 1.5}"#))
                    .expect("request should build"),
            )
            .await
            .expect("request should return a response");
        assert_eq!(response.status(), StatusCode::OK);
    }
}
