//! Request DTOs for the proxy API
//!
//! Defines the query parameters of incoming HTTP requests.

use serde::Deserialize;

/// Query string of `GET /api/proxy/img`
///
/// # Fields
/// - `u`: The source image URL, decoded once by the extractor
/// - `fmt`: Optional output format hint (`webp`)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxyQuery {
    /// The source URL
    #[serde(default)]
    pub u: Option<String>,
    /// Output format hint
    #[serde(default)]
    pub fmt: Option<String>,
}

impl ProxyQuery {
    /// Returns the trimmed source URL, or None if absent or blank.
    pub fn source(&self) -> Option<&str> {
        self.u.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }

    /// True when the caller asked for a WebP variant.
    pub fn wants_webp(&self) -> bool {
        self.fmt
            .as_deref()
            .is_some_and(|fmt| fmt.eq_ignore_ascii_case("webp"))
    }
}
