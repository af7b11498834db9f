use axum::{
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::Json,
    routing::get,
    Router,
};
use serde_json::json;
use std::net::SocketAddr;

use crate::{click::ClickContext, middleware::rate_limit, service::AppState};

/// HTTP surface of the edge service
///
/// Everything under `/api` passes through admission control.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/geo/:ip", get(geo_lookup))
        .route("/visitor", get(visitor))
        .route_layer(middleware::from_fn_with_state(
            state.limiter.clone(),
            rate_limit,
        ));

    Router::new()
        .route("/healthcheck", get(health_check))
        .route("/metrics", get(metrics_handler))
        .nest("/api", api)
        .with_state(state)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn metrics_handler(State(state): State<AppState>) -> Result<String, StatusCode> {
    state
        .metrics
        .encode()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

async fn geo_lookup(
    State(state): State<AppState>,
    Path(ip): Path<String>,
) -> Json<serde_json::Value> {
    let country = state.geo.lookup_country(&ip).await;
    Json(json!({ "ip": ip, "country": country }))
}

async fn visitor(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Json<ClickContext> {
    let peer = peer.map(|ConnectInfo(addr)| addr);
    let context = ClickContext::capture(&headers, peer, &state.geo, &state.hash_salt).await;
    Json(context)
}
