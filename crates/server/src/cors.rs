// CORS configuration for the progress API.
//
// The player page is served from a different origin than the API, so
// browsers need explicit CORS headers on both preflight and simple requests.

use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Origins allowed when no override is configured.
pub const DEFAULT_ORIGINS: &[&str] = &["http://localhost:3000", "http://127.0.0.1:3000"];

/// Build a [`CorsLayer`] from a configured origin list.
///
/// - `"*"` allows any origin.
/// - A comma-separated list allows exactly those origins.
/// - `None` allows [`DEFAULT_ORIGINS`].
pub fn cors_layer(origins: Option<&str>) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE, HeaderName::from_static("x-request-id")])
        .expose_headers([HeaderName::from_static("x-request-id")])
        .max_age(std::time::Duration::from_secs(3600));

    match origins {
        Some("*") => base.allow_origin(AllowOrigin::any()),
        Some(origins) => base.allow_origin(parse_origins(origins)),
        None => base.allow_origin(parse_origins(&DEFAULT_ORIGINS.join(","))),
    }
}

fn parse_origins(comma_separated: &str) -> Vec<HeaderValue> {
    comma_separated
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| HeaderValue::from_str(s).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, response::IntoResponse, routing::get, Router};
    use tower::ServiceExt;

    async fn ok_handler() -> impl IntoResponse {
        "ok"
    }

    fn test_app(origins: Option<&str>) -> Router {
        Router::new().route("/test", get(ok_handler)).layer(cors_layer(origins))
    }

    fn preflight(origin: &str) -> Request<Body> {
        Request::builder()
            .method(Method::OPTIONS)
            .uri("/test")
            .header("origin", origin)
            .header("access-control-request-method", "POST")
            .body(Body::empty())
            .expect("preflight request should build")
    }

    #[tokio::test]
    async fn preflight_allows_player_origin_by_default() {
        let response = test_app(None)
            .oneshot(preflight("http://localhost:3000"))
            .await
            .expect("preflight should return a response");

        assert_eq!(
            response.headers().get("access-control-allow-origin").map(|v| v.as_bytes()),
            Some(&b"http://localhost:3000"[..])
        );
        assert_eq!(
            response.headers().get("access-control-max-age").map(|v| v.as_bytes()),
            Some(&b"3600"[..])
        );
    }

    #[tokio::test]
    async fn preflight_rejects_unknown_origin() {
        let response = test_app(None)
            .oneshot(preflight("https://evil.example.com"))
            .await
            .expect("preflight should return a response");

        assert!(response.headers().get("access-control-allow-origin").is_none());
    }

    #[tokio::test]
    async fn configured_origins_replace_defaults() {
        let app = test_app(Some("https://learn.example.com, https://staging.example.com"));

        let allowed = app
            .clone()
            .oneshot(preflight("https://staging.example.com"))
            .await
            .expect("preflight should return a response");
        assert_eq!(
            allowed.headers().get("access-control-allow-origin").map(|v| v.as_bytes()),
            Some(&b"https://staging.example.com"[..])
        );

        let default = app
            .oneshot(preflight("http://localhost:3000"))
            .await
            .expect("preflight should return a response");
        assert!(default.headers().get("access-control-allow-origin").is_none());
    }

    #[tokio::test]
    async fn wildcard_allows_any_origin() {
        let response = test_app(Some("*"))
            .oneshot(preflight("https://anything.example.com"))
            .await
            .expect("preflight should return a response");

        assert_eq!(
            response.headers().get("access-control-allow-origin").map(|v| v.as_bytes()),
            Some(&b"*"[..])
        );
    }

    #[test]
    fn parse_origins_handles_whitespace() {
        let origins = parse_origins("  https://a.com , https://b.com  , ");
        assert_eq!(origins, vec!["https://a.com", "https://b.com"]);
    }
}
