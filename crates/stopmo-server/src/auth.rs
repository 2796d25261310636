// ABOUTME: Bearer token authentication middleware for event ingress.
// ABOUTME: Guards POST /events only; with no configured token every ingress call is refused.

use axum::Json;
use axum::body::Body;
use axum::http::{Method, Request, Response, StatusCode};
use axum::response::IntoResponse;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Path of the server-to-server event ingress.
pub const INGRESS_PATH: &str = "/events";

/// A tower Layer that applies bearer token authentication to event ingress.
#[derive(Clone)]
pub struct AuthLayer {
    token: Option<Arc<String>>,
}

impl AuthLayer {
    /// `None` means no token is configured, so ingress is always rejected.
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()).map(Arc::new),
        }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware {
            inner,
            token: self.token.clone(),
        }
    }
}

/// The middleware service that checks bearer tokens on ingress.
#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    token: Option<Arc<String>>,
}

fn is_protected<B>(req: &Request<B>) -> bool {
    req.method() == Method::POST && req.uri().path() == INGRESS_PATH
}

/// Compare without bailing out at the first differing byte.
fn tokens_match(presented: &str, expected: &str) -> bool {
    let (a, b) = (presented.as_bytes(), expected.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

impl<S> Service<Request<Body>> for AuthMiddleware<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        if !is_protected(&req) {
            let mut inner = self.inner.clone();
            return Box::pin(async move { inner.call(req).await });
        }

        let presented = req
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        let authorized = match (&self.token, presented) {
            (Some(expected), Some(presented)) => tokens_match(presented, expected),
            _ => false,
        };

        if authorized {
            let mut inner = self.inner.clone();
            return Box::pin(async move { inner.call(req).await });
        }

        if self.token.is_none() {
            tracing::warn!("event ingress rejected: no token configured");
        } else {
            tracing::warn!("event ingress rejected: bad or missing bearer token");
        }
        Box::pin(async move {
            let body = serde_json::json!({ "error": "unauthorized" });
            Ok((StatusCode::UNAUTHORIZED, Json(body)).into_response())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::routing::get;
    use http::Request;
    use tower::ServiceExt;

    fn test_router(token: Option<&str>) -> Router {
        Router::new()
            .route("/events", get(|| async { "stream" }).post(|| async { "accepted" }))
            .route("/frames", axum::routing::post(|| async { "frame" }))
            .route("/health", get(|| async { "ok" }))
            .layer(AuthLayer::new(token.map(str::to_string)))
    }

    fn ingress(auth: Option<&str>) -> Request<Body> {
        let mut req = Request::post("/events");
        if let Some(auth) = auth {
            req = req.header("authorization", auth);
        }
        req.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn auth_middleware_rejects_without_token() {
        let resp = test_router(Some("test-token-123"))
            .oneshot(ingress(None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn auth_middleware_allows_with_valid_token() {
        let resp = test_router(Some("test-token-123"))
            .oneshot(ingress(Some("Bearer test-token-123")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn auth_middleware_rejects_with_wrong_token() {
        for auth in ["Bearer wrong-token", "Bearer test-token-12", "test-token-123", "Basic x"] {
            let resp = test_router(Some("test-token-123"))
                .oneshot(ingress(Some(auth)))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{auth:?}");
        }
    }

    #[tokio::test]
    async fn auth_middleware_rejects_everything_without_configured_token() {
        let resp = test_router(None)
            .oneshot(ingress(Some("Bearer ")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "unauthorized");
    }

    #[tokio::test]
    async fn auth_middleware_exempts_subscription_and_other_routes() {
        let app = test_router(Some("test-token-123"));

        let resp = app
            .clone()
            .oneshot(Request::get("/events").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .clone()
            .oneshot(Request::post("/frames").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[test]
    fn token_comparison() {
        assert!(tokens_match("abc", "abc"));
        assert!(!tokens_match("abd", "abc"));
        assert!(!tokens_match("ab", "abc"));
    }
}
