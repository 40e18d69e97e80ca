use crate::AppState;
use crate::offline_cache::{
    CacheError, Fetcher, Interception, OfflineWorker, Request, Response, ResponseSource,
};
use axum::{
    Json, Router,
    body::Body,
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, Method, StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, warn};

/// Response header naming where a proxied response came from
pub const SOURCE_HEADER: &str = "x-offline-source";

/// Upstream response headers that describe the upstream connection rather
/// than the response, and so are never relayed
const SKIP_RESPONSE_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
    "content-length",
];

pub fn create_app(state: AppState) -> Router {
    let body_limit = state.config.max_body_bytes;
    Router::new()
        .route("/__offline/status", get(handle_status))
        .route("/__offline/update", post(handle_update))
        .fallback(handle_intercept)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive()) // Allow CORS for all origins during development
        .with_state(state)
}

async fn handle_status(State(state): State<AppState>) -> axum::response::Response {
    match state.worker.status().await {
        Ok(status) => Json(status).into_response(),
        Err(e) => {
            error!("Failed to read worker status: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read worker status").into_response()
        }
    }
}

async fn handle_update(State(state): State<AppState>) -> axum::response::Response {
    info!("📡 Received POST /__offline/update");

    let install = match state.worker.on_install().await {
        Ok(report) => report,
        Err(e) => {
            warn!("Update of {} failed: {}", state.config.cache_version, e);
            return (StatusCode::BAD_GATEWAY, Json(json!({ "error": e.to_string() })))
                .into_response();
        }
    };

    match state.worker.on_activate().await {
        Ok(activate) => {
            info!("✅ Updated offline cache {}", activate.version);
            Json(json!({ "install": install, "activate": activate })).into_response()
        }
        Err(e) => {
            error!("❌ Activation after update failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn handle_intercept(
    State(state): State<AppState>,
    request: axum::extract::Request,
) -> axum::response::Response {
    let (parts, body) = request.into_parts();

    let body = match axum::body::to_bytes(body, state.config.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Rejecting request body for {}: {}", parts.uri, e);
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
    };

    // Path and query only, so the request can never leave the upstream origin
    let mut url = state.config.upstream.clone();
    url.set_path(parts.uri.path());
    url.set_query(parts.uri.query());

    let mut request = Request::new(parts.method.as_str(), url).with_body(body);
    for (name, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            request = request.with_header(name.as_str(), value);
        }
    }
    if is_navigation(&parts.method, &parts.headers) {
        request = request.as_navigation();
    }

    debug!(
        "Intercepting {} {} (navigation: {})",
        request.method, request.url, request.navigation
    );

    match state.worker.intercept(request.clone()).await {
        Interception::Respond { response, source } => into_http(response, source),
        Interception::Passthrough => match state.fetcher.fetch(&request).await {
            Ok(response) => into_http(response, ResponseSource::Network),
            Err(e) => network_failure(&request, e),
        },
        Interception::NoResponse => {
            debug!("No response for {} {}", request.method, request.url);
            StatusCode::GATEWAY_TIMEOUT.into_response()
        }
    }
}

/// Whether a request is a top-level document navigation
///
/// `Sec-Fetch-Mode` decides when the client sends it; otherwise a GET
/// accepting HTML is treated as one.
pub fn is_navigation(method: &Method, headers: &HeaderMap) -> bool {
    if let Some(mode) = headers.get("sec-fetch-mode").and_then(|v| v.to_str().ok()) {
        return mode.eq_ignore_ascii_case("navigate");
    }
    method == Method::GET
        && headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|accept| accept.contains("text/html"))
}

fn into_http(response: Response, source: ResponseSource) -> axum::response::Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let (_, headers, body) = response.into_parts();

    let mut builder = axum::http::Response::builder().status(status);
    for (name, value) in &headers {
        if SKIP_RESPONSE_HEADERS
            .iter()
            .any(|h| name.eq_ignore_ascii_case(h))
        {
            continue;
        }
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder = builder.header(SOURCE_HEADER, source.as_str());

    match builder.body(Body::from(body)) {
        Ok(response) => response,
        Err(e) => {
            error!("Failed to build response: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Invalid upstream response").into_response()
        }
    }
}

fn network_failure(request: &Request, e: CacheError) -> axum::response::Response {
    warn!("Passthrough of {} failed: {}", request.url, e);
    StatusCode::BAD_GATEWAY.into_response()
}
