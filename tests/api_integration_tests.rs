//! Integration Tests for API Endpoints
//!
//! Tests the full request/response cycle of the proxy, with stubbed and real
//! upstreams.

use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Redirect,
    routing::get,
    Router,
};
use bytes::Bytes;
use img_proxy::{
    api::create_router,
    cache::{key_for, DiskCache},
    error::FetchError,
    fetch::{HttpUpstream, Upstream, UpstreamResponse},
    guard::{HostPolicy, StaticResolver},
    AppState,
};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use url::Url;

const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR\x00\x00\x00\x01\x00\x00\x00\x01";
const PUBLIC_IP: &str = "93.184.216.34";

// == Helper Functions ==

/// Upstream stub that replays one reply and counts how often it was asked.
struct CountingUpstream {
    calls: AtomicUsize,
    reply: Result<UpstreamResponse, FetchError>,
}

impl CountingUpstream {
    fn png() -> Self {
        Self::replying(Ok(UpstreamResponse {
            bytes: Bytes::from_static(PNG),
            content_type: Some("image/png".to_string()),
        }))
    }

    fn replying(reply: Result<UpstreamResponse, FetchError>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            reply,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Upstream for CountingUpstream {
    async fn get(&self, _url: &Url) -> Result<UpstreamResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.clone()
    }
}

async fn create_test_state(upstream: Arc<CountingUpstream>) -> (TempDir, AppState) {
    let dir = TempDir::new().unwrap();
    let store = DiskCache::open(dir.path()).await.unwrap();
    let public: IpAddr = PUBLIC_IP.parse().unwrap();
    let resolver = StaticResolver::new()
        .with("cdn.example.com", &[public])
        .with("rebind.example.com", &[public, "10.0.0.7".parse().unwrap()]);
    let state = AppState::new(
        store,
        HostPolicy::default(),
        Arc::new(resolver),
        upstream,
        true,
    );
    (dir, state)
}

async fn send(app: &Router, uri: &str) -> axum::response::Response {
    app.clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_to_bytes(body: Body) -> Bytes {
    axum::body::to_bytes(body, usize::MAX).await.unwrap()
}

// == SSRF Guard Tests ==

#[tokio::test]
async fn test_loopback_literal_is_blocked() {
    let upstream = Arc::new(CountingUpstream::png());
    let (_dir, state) = create_test_state(upstream.clone()).await;
    let app = create_router(state);

    let response = send(&app, "/api/proxy/img?u=https%3A%2F%2F127.0.0.1%2Ftest.jpg").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["error"], "blocked_host");
    assert_eq!(upstream.calls(), 0);
}

#[tokio::test]
async fn test_nested_proxy_without_inner_url() {
    let upstream = Arc::new(CountingUpstream::png());
    let (_dir, state) = create_test_state(upstream.clone()).await;
    let app = create_router(state);

    let response = send(&app, "/api/proxy/img?u=%2Fapi%2Fproxy%2Fimg").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["error"], "nested_proxy_missing_inner_url");
    assert_eq!(upstream.calls(), 0);
}

#[tokio::test]
async fn test_nested_proxy_with_inner_url_is_unwrapped() {
    let upstream = Arc::new(CountingUpstream::png());
    let (_dir, state) = create_test_state(upstream.clone()).await;
    let app = create_router(state);

    // u=/api/proxy/img?u=https://cdn.example.com/a.png
    let response = send(
        &app,
        "/api/proxy/img?u=%2Fapi%2Fproxy%2Fimg%3Fu%3Dhttps%253A%252F%252Fcdn.example.com%252Fa.png",
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(upstream.calls(), 1);
}

#[tokio::test]
async fn test_mixed_resolution_is_blocked() {
    let upstream = Arc::new(CountingUpstream::png());
    let (_dir, state) = create_test_state(upstream.clone()).await;
    let app = create_router(state.clone());

    let response = send(&app, "/api/proxy/img?u=https%3A%2F%2Frebind.example.com%2Fa.png").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["error"], "blocked_host");
    assert_eq!(state.stats.snapshot().rejections, 1);
}

#[tokio::test]
async fn test_non_http_scheme_is_rejected() {
    let upstream = Arc::new(CountingUpstream::png());
    let (_dir, state) = create_test_state(upstream).await;
    let app = create_router(state);

    let response = send(&app, "/api/proxy/img?u=gopher%3A%2F%2Fcdn.example.com%2Fa.png").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["error"], "invalid_scheme");
}

// == Cache Tests ==

#[tokio::test]
async fn test_fetch_then_cache_hit() {
    let upstream = Arc::new(CountingUpstream::png());
    let (_dir, state) = create_test_state(upstream.clone()).await;
    let app = create_router(state.clone());
    let target = "https://cdn.example.com/photo.png";
    let uri = "/api/proxy/img?u=https%3A%2F%2Fcdn.example.com%2Fphoto.png";

    let first = send(&app, uri).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(first.headers()["x-cache"], "MISS");
    assert_eq!(first.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert!(first.headers().contains_key(header::CONTENT_SECURITY_POLICY));
    assert_eq!(body_to_bytes(first.into_body()).await.as_ref(), PNG);

    let cached = state.store.path_for(&key_for(target));
    assert!(cached.exists(), "Fetched image should be persisted");
    assert_eq!(std::fs::read(&cached).unwrap(), PNG);

    let second = send(&app, uri).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.headers()["x-cache"], "HIT");
    assert_eq!(second.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(body_to_bytes(second.into_body()).await.as_ref(), PNG);

    assert_eq!(upstream.calls(), 1, "Second request must be served from disk");

    let stats = send(&app, "/stats").await;
    let json = body_to_json(stats.into_body()).await;
    assert_eq!(json["hits"], 1);
    assert_eq!(json["misses"], 1);
}

#[tokio::test]
async fn test_concurrent_misses_share_one_fetch() {
    let upstream = Arc::new(CountingUpstream::png());
    let (_dir, state) = create_test_state(upstream.clone()).await;
    let app = create_router(state);
    let uri = "/api/proxy/img?u=https%3A%2F%2Fcdn.example.com%2Fshared.png";

    let responses = send_concurrently(&app, uri, 8).await;

    for status in responses {
        assert_eq!(status, StatusCode::OK);
    }
    assert_eq!(upstream.calls(), 1);
}

async fn send_concurrently(app: &Router, uri: &'static str, n: usize) -> Vec<StatusCode> {
    let mut handles = Vec::with_capacity(n);
    for _ in 0..n {
        let app = app.clone();
        handles.push(tokio::spawn(async move { send(&app, uri).await.status() }));
    }
    let mut statuses = Vec::with_capacity(n);
    for handle in handles {
        statuses.push(handle.await.unwrap());
    }
    statuses
}

#[tokio::test]
async fn test_declared_type_survives_cache_hit() {
    // JPEG XL codestream, which the sniffer does not know
    let upstream = Arc::new(CountingUpstream::replying(Ok(UpstreamResponse {
        bytes: Bytes::from_static(&[0xff, 0x0a, 0x00, 0x01, 0x02, 0x03]),
        content_type: Some("image/jxl".to_string()),
    })));
    let (_dir, state) = create_test_state(upstream.clone()).await;
    let app = create_router(state);
    let uri = "/api/proxy/img?u=https%3A%2F%2Fcdn.example.com%2Fphoto.jxl";

    let first = send(&app, uri).await;
    let second = send(&app, uri).await;

    assert_eq!(first.headers()["x-cache"], "MISS");
    assert_eq!(second.headers()["x-cache"], "HIT");
    assert_eq!(first.headers()[header::CONTENT_TYPE], "image/jxl");
    assert_eq!(
        first.headers()[header::CONTENT_TYPE],
        second.headers()[header::CONTENT_TYPE]
    );
    assert_eq!(upstream.calls(), 1);
}

// == Query Tests ==

#[tokio::test]
async fn test_duplicate_source_parameter_is_json_error() {
    let upstream = Arc::new(CountingUpstream::png());
    let (_dir, state) = create_test_state(upstream.clone()).await;
    let app = create_router(state);

    let response = send(
        &app,
        "/api/proxy/img?u=https%3A%2F%2Fcdn.example.com%2Fa.png&u=https%3A%2F%2Fcdn.example.com%2Fb.png",
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["error"], "invalid_query");
    assert_eq!(upstream.calls(), 0);
}

// == Upstream Failure Tests ==

#[tokio::test]
async fn test_upstream_error_status() {
    let upstream = Arc::new(CountingUpstream::replying(Err(FetchError::UpstreamStatus(404))));
    let (_dir, state) = create_test_state(upstream).await;
    let app = create_router(state.clone());

    let response = send(&app, "/api/proxy/img?u=https%3A%2F%2Fcdn.example.com%2Fgone.png").await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["error"], "upstream_status");
    assert_eq!(json["status"], 404);

    let cached = state.store.path_for(&key_for("https://cdn.example.com/gone.png"));
    assert!(!cached.exists(), "Failed fetch must not be cached");
}

#[tokio::test]
async fn test_upstream_transport_failure() {
    let upstream = Arc::new(CountingUpstream::replying(Err(FetchError::Transport(
        "connection refused".to_string(),
    ))));
    let (_dir, state) = create_test_state(upstream).await;
    let app = create_router(state);

    let response = send(&app, "/api/proxy/img?u=https%3A%2F%2Fcdn.example.com%2Fa.png").await;

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["error"], "upstream_unavailable");
}

#[tokio::test]
async fn test_non_image_body_is_refused() {
    let upstream = Arc::new(CountingUpstream::replying(Ok(UpstreamResponse {
        bytes: Bytes::from_static(b"<html>not an image</html>"),
        content_type: Some("text/html".to_string()),
    })));
    let (_dir, state) = create_test_state(upstream).await;
    let app = create_router(state);

    let response = send(&app, "/api/proxy/img?u=https%3A%2F%2Fcdn.example.com%2Fpage").await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["error"], "invalid_upstream_content");
}

// == Real HTTP Upstream Tests ==

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(1);
const UPSTREAM_MAX_BYTES: usize = 64;

/// Local image origin on an ephemeral port. Unknown paths are 404.
async fn spawn_image_server() -> u16 {
    let app = Router::new()
        .route(
            "/a.png",
            get(|| async { ([(header::CONTENT_TYPE, "image/png")], PNG) }),
        )
        .route("/hop", get(|| async { Redirect::temporary("/a.png") }))
        .route(
            "/redir",
            get(|| async { Redirect::temporary("http://127.0.0.1:1/x.png") }),
        )
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(UPSTREAM_TIMEOUT * 3).await;
                ([(header::CONTENT_TYPE, "image/png")], PNG)
            }),
        )
        .route(
            "/big",
            get(|| async {
                let mut body = PNG.to_vec();
                body.resize(UPSTREAM_MAX_BYTES * 64, 0);
                ([(header::CONTENT_TYPE, "image/png")], body)
            }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    port
}

async fn create_real_upstream_app() -> (TempDir, Router) {
    let dir = TempDir::new().unwrap();
    let store = DiskCache::open(dir.path()).await.unwrap();
    let policy = HostPolicy::new(Vec::new(), vec!["images.test".to_string()]);
    let resolver = Arc::new(
        StaticResolver::new().with("images.test", &["127.0.0.1".parse().unwrap()]),
    );
    let upstream = HttpUpstream::new(
        UPSTREAM_TIMEOUT,
        5,
        UPSTREAM_MAX_BYTES,
        Arc::new(policy.clone()),
        resolver.clone(),
    )
    .unwrap();
    let state = AppState::new(store, policy, resolver, Arc::new(upstream), true);
    (dir, create_router(state))
}

fn real_upstream_uri(port: u16, path: &str) -> String {
    format!("/api/proxy/img?u=http%3A%2F%2Fimages.test%3A{port}%2F{path}")
}

#[tokio::test]
async fn test_real_upstream_fetch() {
    let port = spawn_image_server().await;
    let (_dir, app) = create_real_upstream_app().await;
    let uri = real_upstream_uri(port, "a.png");

    let first = send(&app, &uri).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(first.headers()["x-cache"], "MISS");
    assert_eq!(body_to_bytes(first.into_body()).await.as_ref(), PNG);

    let second = send(&app, &uri).await;
    assert_eq!(second.headers()["x-cache"], "HIT");
}

#[tokio::test]
async fn test_real_upstream_not_found() {
    let port = spawn_image_server().await;
    let (_dir, app) = create_real_upstream_app().await;
    let uri = real_upstream_uri(port, "missing.png");

    let response = send(&app, &uri).await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["error"], "upstream_status");
    assert_eq!(json["status"], 404);
}

#[tokio::test]
async fn test_real_upstream_follows_permitted_redirect() {
    let port = spawn_image_server().await;
    let (_dir, app) = create_real_upstream_app().await;

    let response = send(&app, &real_upstream_uri(port, "hop")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_to_bytes(response.into_body()).await.as_ref(), PNG);
}

#[tokio::test]
async fn test_real_upstream_redirect_to_loopback_refused() {
    let port = spawn_image_server().await;
    let (_dir, app) = create_real_upstream_app().await;

    let response = send(&app, &real_upstream_uri(port, "redir")).await;

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["error"], "upstream_unavailable");
}

#[tokio::test]
async fn test_real_upstream_timeout() {
    let port = spawn_image_server().await;
    let (_dir, app) = create_real_upstream_app().await;

    let started = std::time::Instant::now();
    let response = send(&app, &real_upstream_uri(port, "slow")).await;

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["error"], "upstream_unavailable");
    assert!(started.elapsed() < UPSTREAM_TIMEOUT * 3);
}

#[tokio::test]
async fn test_real_upstream_body_over_cap() {
    let port = spawn_image_server().await;
    let (dir, app) = create_real_upstream_app().await;

    let response = send(&app, &real_upstream_uri(port, "big")).await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["error"], "invalid_upstream_content");
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

// == Health and Stats Tests ==

#[tokio::test]
async fn test_health_endpoint() {
    let (_dir, state) = create_test_state(Arc::new(CountingUpstream::png())).await;
    let app = create_router(state);

    let response = send(&app, "/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], "healthy");
    assert!(json.get("timestamp").is_some());
}

#[tokio::test]
async fn test_unknown_route_returns_404() {
    let (_dir, state) = create_test_state(Arc::new(CountingUpstream::png())).await;
    let app = create_router(state);

    let response = send(&app, "/unknown").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
