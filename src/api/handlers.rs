//! API Handlers
//!
//! HTTP request handlers for each proxy endpoint.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    body::Body,
    extract::{rejection::QueryRejection, Query, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::Response,
    Json,
};
use tracing::{debug, warn};

use crate::cache::{DiskCache, ProxyStats};
use crate::config::Config;
use crate::error::{ProxyError, Result};
use crate::fetch::{CacheOrigin, CachedImage, FetchPipeline, HttpUpstream, Upstream, OCTET_STREAM};
use crate::guard::{Classifier, HostPolicy, HostResolver, SystemResolver, Verdict};
use crate::models::{HealthResponse, ProxyQuery, StatsResponse};

/// Served bytes are never to be interpreted as a document.
const IMAGE_CSP: &str = "default-src 'none'; style-src 'unsafe-inline'; sandbox";
const IMAGE_CACHE_CONTROL: &str = "public, max-age=86400";

/// Application state shared across all handlers.
///
/// Holds no mutable request state itself; cached data is coordinated through
/// the disk cache.
#[derive(Clone)]
pub struct AppState {
    /// SSRF guard
    pub classifier: Arc<Classifier>,
    /// Fetch-and-persist pipeline
    pub pipeline: Arc<FetchPipeline>,
    /// Disk cache filled by the pipeline
    pub store: Arc<DiskCache>,
    /// Request counters
    pub stats: Arc<ProxyStats>,
}

impl AppState {
    /// Wires the components together around an opened cache.
    pub fn new(
        store: DiskCache,
        policy: HostPolicy,
        resolver: Arc<dyn HostResolver>,
        upstream: Arc<dyn Upstream>,
        dedupe_in_flight: bool,
    ) -> Self {
        let store = Arc::new(store);
        let stats = Arc::new(ProxyStats::new());
        let classifier = Classifier::new(Arc::new(policy), resolver);
        let pipeline = FetchPipeline::new(
            Arc::clone(&store),
            upstream,
            Arc::clone(&stats),
            dedupe_in_flight,
        );

        Self {
            classifier: Arc::new(classifier),
            pipeline: Arc::new(pipeline),
            store,
            stats,
        }
    }

    /// Creates a new AppState from configuration.
    ///
    /// Opens the cache directory and builds the hardened HTTP client.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let store = DiskCache::open(&config.cache_dir)
            .await
            .with_context(|| format!("failed to open cache dir {}", config.cache_dir.display()))?;

        let policy = HostPolicy::from_config(config);
        let resolver: Arc<dyn HostResolver> = Arc::new(SystemResolver);
        let upstream = HttpUpstream::from_config(config, Arc::new(policy.clone()), Arc::clone(&resolver))
            .context("failed to build upstream HTTP client")?;

        Ok(Self::new(
            store,
            policy,
            resolver,
            Arc::new(upstream),
            config.dedupe_in_flight,
        ))
    }
}

/// Handler for GET /api/proxy/img
///
/// Classifies `u`, then serves the image from cache or upstream.
pub async fn proxy_handler(
    State(state): State<AppState>,
    query: std::result::Result<Query<ProxyQuery>, QueryRejection>,
) -> Result<Response> {
    let Query(query) = query.map_err(|rejection| {
        let detail = rejection.body_text();
        debug!(error = %detail, "Malformed proxy query");
        ProxyError::InvalidQuery(detail)
    })?;
    let source = query.source().ok_or(ProxyError::MissingUrl)?;
    if query.wants_webp() {
        // No transcoding; the original bytes are served
        debug!("WebP variant requested");
    }

    let url = match state.classifier.classify(source).await? {
        Verdict::Allowed(url) => url,
        Verdict::Rejected(rejection) => {
            state.stats.record_rejection();
            return Err(ProxyError::Rejected(rejection));
        }
    };

    let image = state.pipeline.fetch_and_cache(&url).await.map_err(|e| {
        warn!(url = %url, error = %e, "Image fetch failed");
        ProxyError::from(e)
    })?;

    Ok(image_response(image))
}

fn image_response(image: CachedImage) -> Response {
    let content_type = HeaderValue::from_str(&image.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(OCTET_STREAM));
    let cache_status = match image.origin {
        CacheOrigin::Cache => "HIT",
        CacheOrigin::Upstream => "MISS",
    };

    let mut response = Response::new(Body::from(image.bytes));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(IMAGE_CACHE_CONTROL));
    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(header::CONTENT_SECURITY_POLICY, HeaderValue::from_static(IMAGE_CSP));
    headers.insert(HeaderName::from_static("x-cache"), HeaderValue::from_static(cache_status));
    response
}

/// Handler for GET /stats
///
/// Returns current proxy statistics.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::from(state.stats.snapshot()))
}

/// Handler for GET /health
///
/// Returns health status of the server.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
