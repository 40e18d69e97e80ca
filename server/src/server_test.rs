#[cfg(test)]
mod tests {
    use crate::offline_cache::memory::MemoryCacheStorage;
    use crate::offline_cache::test_support::{ScriptedFetcher, test_config};
    use crate::offline_cache::{CacheStorage, CacheWorker, Request, ResponseKind};
    use crate::server::{SOURCE_HEADER, create_app, is_navigation};
    use crate::{AppState, OfflineState};
    use axum::Router;
    use axum::body::Body;
    use axum::http::{HeaderMap, Method, StatusCode, header};
    use std::sync::Arc;
    use tower::ServiceExt;

    struct Harness {
        app: Router,
        state: AppState,
        storage: Arc<MemoryCacheStorage>,
        fetcher: Arc<ScriptedFetcher>,
    }

    async fn booted() -> Harness {
        let config = Arc::new(test_config());
        let storage = Arc::new(MemoryCacheStorage::new());
        let fetcher = Arc::new(ScriptedFetcher::serving_manifest(&config));
        let (worker, _) = CacheWorker::boot(config.clone(), storage.clone(), fetcher.clone())
            .await
            .unwrap();
        let state = Arc::new(OfflineState::new(config, worker, fetcher.clone()));
        Harness {
            app: create_app(state.clone()),
            state,
            storage,
            fetcher,
        }
    }

    async fn send(app: &Router, request: axum::http::Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, headers, body.to_vec())
    }

    fn get(uri: &str) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn navigate(uri: &str) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .uri(uri)
            .header("sec-fetch-mode", "navigate")
            .header(header::ACCEPT, "text/html")
            .body(Body::empty())
            .unwrap()
    }

    fn source(headers: &HeaderMap) -> &str {
        headers.get(SOURCE_HEADER).unwrap().to_str().unwrap()
    }

    #[tokio::test]
    async fn test_manifest_entry_served_from_cache() {
        let h = booted().await;
        let calls = h.fetcher.calls();

        let (status, headers, body) = send(&h.app, get("/index.html")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(source(&headers), "cache");
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "text/html");
        assert_eq!(body, b"<page /index.html>");
        assert_eq!(h.fetcher.calls(), calls);
    }

    #[tokio::test]
    async fn test_miss_goes_to_network_then_cache() {
        let h = booted().await;
        h.fetcher.respond_with_headers(
            "http://app.test/assets/chunk.js?v=3",
            200,
            &[("content-type", "text/javascript"), ("connection", "close")],
            "export {}",
        );

        let (status, headers, body) = send(&h.app, get("/assets/chunk.js?v=3")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(source(&headers), "network");
        assert!(headers.get(header::CONNECTION).is_none());
        assert_eq!(body, b"export {}");

        h.state.worker.interceptor().settle().await;
        let (_, headers, body) = send(&h.app, get("/assets/chunk.js?v=3")).await;
        assert_eq!(source(&headers), "cache");
        assert_eq!(body, b"export {}");
        assert_eq!(h.fetcher.calls_for("http://app.test/assets/chunk.js?v=3"), 1);
    }

    #[tokio::test]
    async fn test_offline_navigation_serves_offline_page() {
        let h = booted().await;

        let (status, headers, body) = send(&h.app, navigate("/recipes/123")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(source(&headers), "offline");
        assert_eq!(body, b"<h1>Offline</h1>");
    }

    #[tokio::test]
    async fn test_offline_subresource_is_gateway_timeout() {
        let h = booted().await;

        let (status, headers, body) = send(&h.app, get("/assets/photo.jpg")).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert!(headers.get(SOURCE_HEADER).is_none());
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_post_is_forwarded_and_never_cached() {
        let h = booted().await;
        h.fetcher.respond(
            "http://app.test/api/analyze",
            200,
            ResponseKind::Basic,
            "{\"ingredients\":[]}",
        );
        let entries = h.storage.entry_count("recipe-analyzer-v1").await.unwrap();

        let request = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/api/analyze")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"text\":\"2 eggs\"}"))
            .unwrap();
        let (status, headers, body) = send(&h.app, request).await;
        h.state.worker.interceptor().settle().await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(source(&headers), "network");
        assert_eq!(body, b"{\"ingredients\":[]}");
        assert_eq!(h.storage.entry_count("recipe-analyzer-v1").await.unwrap(), entries);
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let h = booted().await;

        let (status, _, body) = send(&h.app, get("/__offline/status")).await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["configured_version"], "recipe-analyzer-v1");
        assert_eq!(json["active_version"], "recipe-analyzer-v1");
        assert_eq!(json["state"], "activated");
        assert_eq!(json["stores"], serde_json::json!(["recipe-analyzer-v1"]));
        assert_eq!(json["storage_type"], "memory");
    }

    #[tokio::test]
    async fn test_update_endpoint() {
        let h = booted().await;
        let update = || {
            axum::http::Request::builder()
                .method(Method::POST)
                .uri("/__offline/update")
                .body(Body::empty())
                .unwrap()
        };

        let (status, _, body) = send(&h.app, update()).await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["install"]["version"], "recipe-analyzer-v1");
        assert_eq!(json["activate"]["version"], "recipe-analyzer-v1");

        h.fetcher.fail("http://app.test/manifest.json");
        let (status, _, body) = send(&h.app, update()).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["error"].as_str().unwrap().contains("manifest.json"));

        // Still serving the previously installed entries
        let (status, headers, _) = send(&h.app, get("/manifest.json")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(source(&headers), "cache");

        let (_, _, body) = send(&h.app, get("/__offline/status")).await;
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["state"], "activated");
    }

    #[tokio::test]
    async fn test_concurrent_updates_both_succeed() {
        let h = booted().await;
        let update = || {
            axum::http::Request::builder()
                .method(Method::POST)
                .uri("/__offline/update")
                .body(Body::empty())
                .unwrap()
        };

        let (first, second) = tokio::join!(send(&h.app, update()), send(&h.app, update()));
        assert_eq!(first.0, StatusCode::OK);
        assert_eq!(second.0, StatusCode::OK);

        let (_, _, body) = send(&h.app, get("/__offline/status")).await;
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["state"], "activated");
        assert_eq!(json["stores"], serde_json::json!(["recipe-analyzer-v1"]));
    }

    #[test]
    fn test_navigation_detection() {
        let mut headers = HeaderMap::new();
        assert!(!is_navigation(&Method::GET, &headers));

        headers.insert(header::ACCEPT, "text/html,application/xhtml+xml".parse().unwrap());
        assert!(is_navigation(&Method::GET, &headers));
        assert!(!is_navigation(&Method::POST, &headers));

        headers.insert("sec-fetch-mode", "no-cors".parse().unwrap());
        assert!(!is_navigation(&Method::GET, &headers));

        headers.insert("sec-fetch-mode", "navigate".parse().unwrap());
        assert!(is_navigation(&Method::POST, &headers));
    }

    #[tokio::test]
    async fn test_cached_request_matches_upstream_url() {
        let h = booted().await;
        let request = Request::get("http://app.test/").unwrap();
        let hit = h
            .storage
            .match_request("recipe-analyzer-v1", &request)
            .await
            .unwrap();
        assert!(hit.is_some());

        let (status, headers, body) = send(&h.app, navigate("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(source(&headers), "cache");
        assert_eq!(body, b"<page />");
    }
}
