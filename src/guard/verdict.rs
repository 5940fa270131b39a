//! Classification verdicts

use std::fmt;

use url::Url;

/// Outcome of classifying one source URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Safe to proxy; carries the normalized (and unwrapped) target
    Allowed(Url),
    /// Refused before any outbound traffic
    Rejected(Rejection),
}

/// Why a source URL was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rejection {
    /// Points at the proxy itself without an inner `u` to unwrap
    NestedProxyMissingInnerUrl,
    /// Denied name, or an address in a blocked range
    BlockedHost,
    /// Neither `http` nor `https`
    InvalidScheme,
    /// Unparseable, hostless, relative, or carrying credentials
    InvalidUrl,
}

impl Rejection {
    /// Reason code echoed to API consumers.
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::NestedProxyMissingInnerUrl => "nested_proxy_missing_inner_url",
            Rejection::BlockedHost => "blocked_host",
            Rejection::InvalidScheme => "invalid_scheme",
            Rejection::InvalidUrl => "invalid_url",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
