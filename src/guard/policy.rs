//! Host Policy Module
//!
//! Decides which host names and addresses the proxy may talk to. Kept free of
//! any HTTP framework so the rules can be tested on their own.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use url::{Host, Url};

use crate::config::Config;

/// Host names that always point inside the deployment.
const DENIED_NAMES: &[&str] = &["localhost", "metadata", "metadata.google.internal"];

/// Suffixes of names reserved for local or private use.
const DENIED_SUFFIXES: &[&str] = &[".localhost", ".local", ".internal", ".home.arpa"];

// == Address Ranges ==
/// Returns the name of the blocked range `ip` falls into, if any.
///
/// IPv6 forms that embed an IPv4 address (mapped, compatible, NAT64, 6to4)
/// are judged by the embedded address.
pub fn blocked_range(ip: IpAddr) -> Option<&'static str> {
    match ip {
        IpAddr::V4(v4) => blocked_v4(v4),
        IpAddr::V6(v6) => blocked_v6(v6),
    }
}

fn blocked_v4(ip: Ipv4Addr) -> Option<&'static str> {
    let [a, b, c, _] = ip.octets();

    if ip.is_loopback() {
        return Some("loopback");
    }
    if a == 0 {
        return Some("unspecified");
    }
    if ip.is_private() {
        return Some("private");
    }
    if ip.is_link_local() {
        return Some("link-local");
    }
    // 100.64.0.0/10
    if a == 100 && (b & 0xc0) == 64 {
        return Some("shared address space");
    }
    // 192.0.0.0/24
    if a == 192 && b == 0 && c == 0 {
        return Some("protocol assignments");
    }
    // 198.18.0.0/15
    if a == 198 && (b & 0xfe) == 18 {
        return Some("benchmarking");
    }
    if ip.is_broadcast() {
        return Some("broadcast");
    }
    if ip.is_multicast() {
        return Some("multicast");
    }
    // 240.0.0.0/4
    if a >= 240 {
        return Some("reserved");
    }
    None
}

fn blocked_v6(ip: Ipv6Addr) -> Option<&'static str> {
    if ip.is_loopback() {
        return Some("loopback");
    }
    if ip.is_unspecified() {
        return Some("unspecified");
    }
    if ip.is_multicast() {
        return Some("multicast");
    }

    let segments = ip.segments();
    // fe80::/10
    if (segments[0] & 0xffc0) == 0xfe80 {
        return Some("link-local");
    }
    // fc00::/7
    if (segments[0] & 0xfe00) == 0xfc00 {
        return Some("unique-local");
    }

    embedded_v4(ip).and_then(blocked_v4)
}

fn embedded_v4(ip: Ipv6Addr) -> Option<Ipv4Addr> {
    let s = ip.segments();
    let from_pair = |hi: u16, lo: u16| {
        Ipv4Addr::new((hi >> 8) as u8, hi as u8, (lo >> 8) as u8, lo as u8)
    };

    // ::ffff:a.b.c.d and ::a.b.c.d
    if s[..5] == [0; 5] && (s[5] == 0xffff || s[5] == 0) {
        return Some(from_pair(s[6], s[7]));
    }
    // 64:ff9b::/96
    if s[0] == 0x64 && s[1] == 0xff9b && s[2..6] == [0; 4] {
        return Some(from_pair(s[6], s[7]));
    }
    // 2002::/16
    if s[0] == 0x2002 {
        return Some(from_pair(s[1], s[2]));
    }
    None
}

// == Host Policy ==
/// Name and address rules applied to every proxied URL and every connection.
#[derive(Debug, Clone, Default)]
pub struct HostPolicy {
    /// Extra denied names; `*.example` matches any subdomain of `example`
    denied: Vec<String>,
    /// Names exempt from both the name and the address checks
    trusted: Vec<String>,
}

impl HostPolicy {
    /// Creates a policy with extra denied and trusted host patterns.
    pub fn new(denied: Vec<String>, trusted: Vec<String>) -> Self {
        Self {
            denied: denied.iter().map(|h| normalize(h)).collect(),
            trusted: trusted.iter().map(|h| normalize(h)).collect(),
        }
    }

    /// Creates a policy from the configured host lists.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.denied_hosts.clone(), config.trusted_hosts.clone())
    }

    /// Returns true if `host` was explicitly trusted by the operator.
    pub fn is_trusted(&self, host: &str) -> bool {
        let host = normalize(host);
        self.trusted.iter().any(|pattern| matches_pattern(pattern, &host))
    }

    /// Returns true if the host name itself is refused, before any resolution.
    pub fn is_denied_name(&self, host: &str) -> bool {
        let host = normalize(host);
        DENIED_NAMES.contains(&host.as_str())
            || DENIED_SUFFIXES.iter().any(|suffix| host.ends_with(suffix))
            || self.denied.iter().any(|pattern| matches_pattern(pattern, &host))
    }

    /// Returns the first address of `host` that the proxy must not reach.
    ///
    /// Trusted hosts never yield a blocked address.
    pub fn first_blocked(&self, host: &str, addrs: &[IpAddr]) -> Option<IpAddr> {
        if self.is_trusted(host) {
            return None;
        }
        addrs.iter().copied().find(|ip| blocked_range(*ip).is_some())
    }

    /// Checks a URL using only what it spells out: scheme, host name and any
    /// literal address. Domain addresses are checked when they are resolved.
    pub fn permits_literal(&self, url: &Url) -> bool {
        if !matches!(url.scheme(), "http" | "https") {
            return false;
        }
        let Some(host) = url.host_str() else {
            return false;
        };
        if self.is_trusted(host) {
            return true;
        }
        match url.host() {
            Some(Host::Ipv4(ip)) => blocked_v4(ip).is_none(),
            Some(Host::Ipv6(ip)) => blocked_v6(ip).is_none(),
            Some(Host::Domain(name)) => !self.is_denied_name(name),
            None => false,
        }
    }
}

fn normalize(host: &str) -> String {
    host.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim_end_matches('.')
        .to_ascii_lowercase()
}

fn matches_pattern(pattern: &str, host: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(parent) => host
            .strip_suffix(parent)
            .is_some_and(|rest| rest.ends_with('.')),
        None => pattern == host,
    }
}
