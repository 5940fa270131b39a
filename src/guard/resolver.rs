//! Host Resolution
//!
//! DNS lookups used by the classifier, plus the resolver handed to the
//! outbound HTTP client so every connection re-applies the host policy.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use tracing::warn;

use crate::error::ResolveError;
use crate::guard::policy::HostPolicy;

/// Resolves a host name to the addresses a connection could use.
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, ResolveError>;
}

// == System Resolver ==
/// Resolver backed by the operating system (`getaddrinfo`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, ResolveError> {
        let addrs = tokio::net::lookup_host((host, 0))
            .await
            .map_err(|e| ResolveError {
                host: host.to_string(),
                reason: e.to_string(),
            })?;

        let ips: Vec<IpAddr> = addrs.map(|addr| addr.ip()).collect();
        if ips.is_empty() {
            return Err(ResolveError {
                host: host.to_string(),
                reason: "no addresses".to_string(),
            });
        }
        Ok(ips)
    }
}

// == Static Resolver ==
/// Fixed host table, for pinned deployments and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    entries: HashMap<String, Vec<IpAddr>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the addresses for `host`.
    pub fn with(mut self, host: &str, addrs: &[IpAddr]) -> Self {
        self.entries
            .insert(host.to_ascii_lowercase(), addrs.to_vec());
        self
    }
}

#[async_trait]
impl HostResolver for StaticResolver {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, ResolveError> {
        self.entries
            .get(&host.to_ascii_lowercase())
            .filter(|addrs| !addrs.is_empty())
            .cloned()
            .ok_or_else(|| ResolveError {
                host: host.to_string(),
                reason: "unknown host".to_string(),
            })
    }
}

// == Guarded DNS ==
/// DNS resolver for `reqwest` that refuses blocked hosts at connect time.
///
/// The classifier checks addresses before the fetch; this repeats the check
/// on the lookup the connection actually uses, so a name that re-resolves to
/// an internal address between the two is still refused. It also covers
/// every redirect hop.
pub struct GuardedDns {
    resolver: Arc<dyn HostResolver>,
    policy: Arc<HostPolicy>,
}

impl GuardedDns {
    pub fn new(resolver: Arc<dyn HostResolver>, policy: Arc<HostPolicy>) -> Self {
        Self { resolver, policy }
    }
}

impl Resolve for GuardedDns {
    fn resolve(&self, name: Name) -> Resolving {
        let resolver = Arc::clone(&self.resolver);
        let policy = Arc::clone(&self.policy);
        let host = name.as_str().to_string();

        Box::pin(async move { screen(resolver.as_ref(), &policy, &host).await })
    }
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

async fn screen(
    resolver: &dyn HostResolver,
    policy: &HostPolicy,
    host: &str,
) -> Result<Addrs, BoxError> {
    if !policy.is_trusted(host) && policy.is_denied_name(host) {
        warn!(host = %host, "Connection refused: denied host name");
        return Err(Box::new(blocked(host)));
    }

    let ips = resolver.resolve(host).await?;
    if let Some(ip) = policy.first_blocked(host, &ips) {
        warn!(host = %host, ip = %ip, "Connection refused: host resolved to blocked address");
        return Err(Box::new(blocked(host)));
    }

    Ok(Box::new(ips.into_iter().map(|ip| SocketAddr::new(ip, 0))))
}

fn blocked(host: &str) -> ResolveError {
    ResolveError {
        host: host.to_string(),
        reason: "blocked address".to_string(),
    }
}
