//! Error types for the image proxy
//!
//! Provides unified error handling using thiserror.

use std::io;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::guard::Rejection;

// == Proxy Error Enum ==
/// Unified error type returned by the proxy endpoint.
///
/// Every variant resolves to a well-formed JSON response carrying a stable
/// `error` code. Internal details (paths, upstream messages) never reach the body.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// The `u` query parameter was absent or empty
    #[error("missing source url")]
    MissingUrl,

    /// The query string could not be decoded (for example a repeated `u`)
    #[error("invalid query string: {0}")]
    InvalidQuery(String),

    /// The classifier refused the source URL
    #[error("source url rejected: {0}")]
    Rejected(Rejection),

    /// The upstream answered with a non-success status
    #[error("upstream responded with status {0}")]
    UpstreamStatus(u16),

    /// The upstream could not be reached in time
    #[error("upstream unavailable: {0}")]
    Transport(String),

    /// The upstream body is not something we serve as an image
    #[error("invalid upstream content: {0}")]
    InvalidContent(String),
}

impl ProxyError {
    /// Stable machine-readable code echoed in the response body.
    pub fn code(&self) -> &'static str {
        match self {
            ProxyError::MissingUrl => "missing_url",
            ProxyError::InvalidQuery(_) => "invalid_query",
            ProxyError::Rejected(rejection) => rejection.code(),
            ProxyError::UpstreamStatus(_) => "upstream_status",
            ProxyError::Transport(_) => "upstream_unavailable",
            ProxyError::InvalidContent(_) => "invalid_upstream_content",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ProxyError::MissingUrl | ProxyError::InvalidQuery(_) | ProxyError::Rejected(_) => {
                StatusCode::BAD_REQUEST
            }
            ProxyError::UpstreamStatus(_) | ProxyError::InvalidContent(_) => {
                StatusCode::BAD_GATEWAY
            }
            ProxyError::Transport(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ProxyError::UpstreamStatus(code) => json!({
                "error": self.code(),
                "status": code,
            }),
            _ => json!({ "error": self.code() }),
        };

        (status, Json(body)).into_response()
    }
}

// == Fetch Error Enum ==
/// Failure of the fetch-and-persist pipeline.
///
/// Clone so a single in-flight result can be handed to every waiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Upstream replied with a non-2xx status
    #[error("upstream responded with status {0}")]
    UpstreamStatus(u16),

    /// Network failure, DNS failure or timeout
    #[error("transport failure: {0}")]
    Transport(String),

    /// Empty, oversized or non-image body
    #[error("invalid content: {0}")]
    InvalidContent(String),
}

impl From<FetchError> for ProxyError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::UpstreamStatus(code) => ProxyError::UpstreamStatus(code),
            FetchError::Transport(msg) => ProxyError::Transport(msg),
            FetchError::InvalidContent(msg) => ProxyError::InvalidContent(msg),
        }
    }
}

// == Store Error Enum ==
/// Cache store write failure, classified by cause.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Disk full or any other I/O failure
    #[error("cache disk error: {0}")]
    Disk(#[source] io::Error),

    /// The process may not write into the cache directory
    #[error("cache permission error: {0}")]
    Permission(#[source] io::Error),

    /// The cache directory or entry path is unusable
    #[error("cache path error: {0}")]
    Path(#[source] io::Error),
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => StoreError::Permission(err),
            io::ErrorKind::NotFound | io::ErrorKind::InvalidInput => StoreError::Path(err),
            _ => StoreError::Disk(err),
        }
    }
}

// == Resolve Error ==
/// DNS resolution failed for a host that passed the name checks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to resolve {host}: {reason}")]
pub struct ResolveError {
    pub host: String,
    pub reason: String,
}

impl From<ResolveError> for ProxyError {
    fn from(err: ResolveError) -> Self {
        ProxyError::Transport(err.to_string())
    }
}

// == Result Type Alias ==
/// Convenience Result type for the proxy endpoint.
pub type Result<T> = std::result::Result<T, ProxyError>;
