//! URL Classifier
//!
//! Decides whether a caller-supplied image URL may be proxied.

use std::net::IpAddr;
use std::sync::Arc;

use tracing::{debug, warn};
use url::{Host, ParseError, Url};

use crate::error::ResolveError;
use crate::guard::policy::{blocked_range, HostPolicy};
use crate::guard::resolver::HostResolver;
use crate::guard::verdict::{Rejection, Verdict};

/// Path of the proxy endpoint; URLs pointing here are nested proxy calls.
pub const PROXY_PATH: &str = "/api/proxy/img";

/// Deepest chain of nested proxy URLs that is unwrapped.
pub const MAX_NESTING: usize = 4;

/// Base used to inspect root-relative inputs such as `/api/proxy/img?u=...`.
const RELATIVE_BASE: &str = "http://relative.invalid";

/// SSRF guard applied to every proxy request.
pub struct Classifier {
    policy: Arc<HostPolicy>,
    resolver: Arc<dyn HostResolver>,
}

impl Classifier {
    pub fn new(policy: Arc<HostPolicy>, resolver: Arc<dyn HostResolver>) -> Self {
        Self { policy, resolver }
    }

    /// Classifies an already-decoded source URL.
    ///
    /// A DNS failure is returned as an error rather than a verdict: the URL is
    /// not known to be bad, the lookup simply did not complete.
    pub async fn classify(&self, raw_url: &str) -> Result<Verdict, ResolveError> {
        let url = match unwrap_target(raw_url) {
            Ok(url) => url,
            Err(rejection) => {
                warn!(reason = %rejection, "Rejected source url");
                return Ok(Verdict::Rejected(rejection));
            }
        };

        if let Some(rejection) = self.check_host(&url).await? {
            warn!(reason = %rejection, host = url.host_str().unwrap_or(""), "Rejected source url");
            return Ok(Verdict::Rejected(rejection));
        }

        debug!(url = %url, "Source url allowed");
        Ok(Verdict::Allowed(url))
    }

    async fn check_host(&self, url: &Url) -> Result<Option<Rejection>, ResolveError> {
        let Some(host) = url.host_str() else {
            return Ok(Some(Rejection::InvalidUrl));
        };
        if self.policy.is_trusted(host) {
            return Ok(None);
        }

        let addrs: Vec<IpAddr> = match url.host() {
            Some(Host::Ipv4(ip)) => vec![IpAddr::V4(ip)],
            Some(Host::Ipv6(ip)) => vec![IpAddr::V6(ip)],
            Some(Host::Domain(name)) => {
                if self.policy.is_denied_name(name) {
                    return Ok(Some(Rejection::BlockedHost));
                }
                self.resolver.resolve(name).await?
            }
            None => return Ok(Some(Rejection::InvalidUrl)),
        };

        // Every address must pass: the connection may use any of them.
        if let Some(ip) = addrs.iter().copied().find(|ip| blocked_range(*ip).is_some()) {
            debug!(host = host, ip = %ip, range = blocked_range(ip).unwrap_or(""), "Blocked address");
            return Ok(Some(Rejection::BlockedHost));
        }
        Ok(None)
    }
}

/// Applies the rules that need no network access and returns the effective target.
///
/// Nested proxy URLs are unwrapped to their inner `u` parameter, up to
/// [`MAX_NESTING`] levels. A URL is a proxy call when its path is
/// [`PROXY_PATH`], whatever its host, so `https://other.example/api/proxy/img?u=...`
/// is unwrapped like the root-relative form.
pub fn unwrap_target(raw_url: &str) -> Result<Url, Rejection> {
    let mut current = raw_url.trim().to_string();

    for _ in 0..=MAX_NESTING {
        let (url, relative) = parse_source(&current)?;

        if is_proxy_path(&url) {
            current = inner_target(&url).ok_or(Rejection::NestedProxyMissingInnerUrl)?;
            continue;
        }
        if relative {
            return Err(Rejection::InvalidUrl);
        }
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Rejection::InvalidScheme);
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(Rejection::InvalidUrl);
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(Rejection::InvalidUrl);
        }
        return Ok(url);
    }

    Err(Rejection::NestedProxyMissingInnerUrl)
}

fn parse_source(raw: &str) -> Result<(Url, bool), Rejection> {
    if raw.is_empty() || raw.starts_with("//") {
        return Err(Rejection::InvalidUrl);
    }
    if raw.starts_with('/') {
        let base = Url::parse(RELATIVE_BASE).map_err(|_| Rejection::InvalidUrl)?;
        let url = base.join(raw).map_err(|_| Rejection::InvalidUrl)?;
        return Ok((url, true));
    }

    match Url::parse(raw) {
        Ok(url) => Ok((url, false)),
        // Something like `example.com/a.jpg`: no scheme at all
        Err(ParseError::RelativeUrlWithoutBase) => Err(Rejection::InvalidScheme),
        Err(_) => Err(Rejection::InvalidUrl),
    }
}

fn is_proxy_path(url: &Url) -> bool {
    let path = url.path();
    let path = path.strip_suffix('/').unwrap_or(path);
    path.eq_ignore_ascii_case(PROXY_PATH)
}

fn inner_target(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == "u")
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
