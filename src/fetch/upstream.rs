//! Upstream Client Module
//!
//! Outbound GET of a source image, behind a trait so the pipeline can be
//! driven by a stub in tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;
use tracing::{debug, warn};
use url::Url;

use crate::config::Config;
use crate::error::FetchError;
use crate::guard::{GuardedDns, HostPolicy, HostResolver};

const USER_AGENT: &str = concat!("img_proxy/", env!("CARGO_PKG_VERSION"));

/// Body and declared type of a successful upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

/// Source of remote image bytes.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Fetches `url`, following redirects. Non-2xx replies are errors.
    async fn get(&self, url: &Url) -> Result<UpstreamResponse, FetchError>;
}

// == HTTP Upstream ==
/// `reqwest` client hardened for untrusted URLs.
///
/// Every connection resolves through [`GuardedDns`] and every redirect hop is
/// re-checked against the host policy, so neither DNS rebinding nor a redirect
/// can steer the fetch into an internal network.
pub struct HttpUpstream {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpUpstream {
    pub fn new(
        timeout: Duration,
        max_redirects: usize,
        max_bytes: usize,
        policy: Arc<HostPolicy>,
        resolver: Arc<dyn HostResolver>,
    ) -> Result<Self, reqwest::Error> {
        let redirect_policy = Arc::clone(&policy);
        let redirect = Policy::custom(move |attempt| {
            if attempt.previous().len() > max_redirects {
                attempt.error("too many redirects")
            } else if !redirect_policy.permits_literal(attempt.url()) {
                warn!(url = %attempt.url(), "Refused redirect to blocked target");
                attempt.error("redirect to blocked target")
            } else {
                attempt.follow()
            }
        });

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .connect_timeout(timeout)
            .redirect(redirect)
            .no_proxy()
            .dns_resolver(Arc::new(GuardedDns::new(resolver, policy)))
            .build()?;

        Ok(Self { client, max_bytes })
    }

    /// Builds the client from configuration.
    pub fn from_config(
        config: &Config,
        policy: Arc<HostPolicy>,
        resolver: Arc<dyn HostResolver>,
    ) -> Result<Self, reqwest::Error> {
        Self::new(
            config.fetch_timeout(),
            config.max_redirects,
            config.max_image_bytes,
            policy,
            resolver,
        )
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn get(&self, url: &Url) -> Result<UpstreamResponse, FetchError> {
        let mut response = self
            .client
            .get(url.as_str())
            .header(reqwest::header::ACCEPT, "image/avif,image/webp,image/*;q=0.9,*/*;q=0.5")
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            debug!(url = %url, status = status.as_u16(), "Upstream returned error status");
            return Err(FetchError::UpstreamStatus(status.as_u16()));
        }

        if response
            .content_length()
            .is_some_and(|len| len > self.max_bytes as u64)
        {
            return Err(FetchError::InvalidContent("body too large".to_string()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(transport)? {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(FetchError::InvalidContent("body too large".to_string()));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(UpstreamResponse {
            bytes: body.freeze(),
            content_type,
        })
    }
}

fn transport(err: reqwest::Error) -> FetchError {
    let reason = if err.is_timeout() {
        "timed out".to_string()
    } else if err.is_redirect() {
        "redirect refused".to_string()
    } else if err.is_connect() {
        "connection failed".to_string()
    } else {
        "transfer failed".to_string()
    };
    debug!(error = %err, reason = %reason, "Upstream transport failure");
    FetchError::Transport(reason)
}
