use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{net::SocketAddr, sync::Arc};

use crate::{ip::client_ip, limiter::RateLimiter};

/// Admission control for rate-limited routes.
///
/// Install with `axum::middleware::from_fn_with_state(limiter, rate_limit)`.
/// Denied requests get `429 Too Many Requests` with a `Retry-After` header and
/// never reach the wrapped handler.
pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = client_ip(request.headers(), peer);

    let decision = limiter.allow(&client);
    if decision.admitted {
        return next.run(request).await;
    }

    too_many_requests(decision.retry_after_secs, limiter.capacity())
}

fn too_many_requests(retry_after_secs: u64, per_minute: u32) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, retry_after_secs.to_string())],
        format!("rate limit exceeded (max {} requests/minute)", per_minute),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request as HttpRequest, middleware, routing::post, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(limiter: Arc<RateLimiter>, hits: Arc<AtomicUsize>) -> Router {
        Router::new()
            .route(
                "/shorten",
                post(move || {
                    let hits = hits.clone();
                    async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        "ok"
                    }
                }),
            )
            .route_layer(middleware::from_fn_with_state(limiter, rate_limit))
    }

    fn request_from(ip: &str) -> HttpRequest<Body> {
        HttpRequest::post("/shorten")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_denied_request_skips_handler() {
        let limiter = Arc::new(RateLimiter::new(2, Duration::from_secs(60)));
        let hits = Arc::new(AtomicUsize::new(0));
        let app = app(limiter, hits.clone());

        for _ in 0..2 {
            let res = app.clone().oneshot(request_from("203.0.113.9")).await.unwrap();
            assert_eq!(res.status(), StatusCode::OK);
        }

        let res = app.clone().oneshot(request_from("203.0.113.9")).await.unwrap();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry: u64 = res.headers()[header::RETRY_AFTER]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(retry >= 1);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_clients_limited_separately() {
        let limiter = Arc::new(RateLimiter::new(1, Duration::from_secs(60)));
        let app = app(limiter.clone(), Arc::new(AtomicUsize::new(0)));

        let first = app.clone().oneshot(request_from("198.51.100.1")).await.unwrap();
        let other = app.clone().oneshot(request_from("198.51.100.2")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(other.status(), StatusCode::OK);
        assert_eq!(limiter.len(), 2);
    }

    #[tokio::test]
    async fn test_peer_address_used_without_headers() {
        let limiter = Arc::new(RateLimiter::new(1, Duration::from_secs(60)));
        let app = app(limiter.clone(), Arc::new(AtomicUsize::new(0)));

        let mut request = HttpRequest::post("/shorten").body(Body::empty()).unwrap();
        let peer: SocketAddr = "192.0.2.44:51000".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(peer));

        let res = app.oneshot(request).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(limiter.tokens("192.0.2.44").is_some());
    }
}
