//! Authentication Middleware
//!
//! Axum middleware checking the `x-api-key` header against the configured
//! internal key.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

pub const API_KEY_HEADER: &str = "x-api-key";

/// Internal API key, `None` when authentication is disabled.
#[derive(Clone, Default)]
pub struct ApiKey(pub Option<Arc<str>>);

impl ApiKey {
    pub fn new(key: Option<String>) -> Self {
        Self(key.map(Arc::from))
    }
}

pub struct AuthMiddleware;

impl AuthMiddleware {
    pub async fn validate_api_key(
        State(api_key): State<ApiKey>,
        req: Request,
        next: Next,
    ) -> Result<Response, StatusCode> {
        let Some(expected) = api_key.0.as_deref() else {
            return Ok(next.run(req).await);
        };

        let provided = req
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok());

        match provided {
            Some(key) if key == expected => Ok(next.run(req).await),
            Some(_) => {
                tracing::warn!("[AuthMiddleware] Invalid API key for {} {}", req.method(), req.uri());
                Err(StatusCode::UNAUTHORIZED)
            }
            None => {
                tracing::warn!("[AuthMiddleware] Missing API key for {} {}", req.method(), req.uri());
                Err(StatusCode::UNAUTHORIZED)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, middleware, routing::get};
    use tower::ServiceExt;

    fn app(key: Option<&str>) -> Router {
        Router::new()
            .route("/protected", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(
                ApiKey::new(key.map(str::to_string)),
                AuthMiddleware::validate_api_key,
            ))
    }

    fn request(key: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/protected");
        if let Some(key) = key {
            builder = builder.header(API_KEY_HEADER, key);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn disabled_auth_lets_everything_through() {
        let response = app(None).oneshot(request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_or_wrong_key_is_unauthorized() {
        let response = app(Some("secret")).oneshot(request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app(Some("secret")).oneshot(request(Some("guess"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn matching_key_passes() {
        let response = app(Some("secret")).oneshot(request(Some("secret"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
