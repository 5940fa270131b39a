//! API Routes
//!
//! Configures the Axum router with all proxy endpoints.

use axum::{http::Method, routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{health_handler, proxy_handler, stats_handler, AppState};
use crate::guard::PROXY_PATH;

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /api/proxy/img?u=<url>[&fmt=webp]` - Proxy an external image
/// - `GET /stats` - Proxy statistics
/// - `GET /health` - Health check endpoint
///
/// # Middleware
/// - CORS: Any origin may load images (GET only)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::HEAD])
        .allow_headers(Any);

    Router::new()
        .route(PROXY_PATH, get(proxy_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
