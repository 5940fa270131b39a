//! Asset URL rewriting
//!
//! Decides whether an asset reference is routed through the image proxy.

use url::form_urlencoded;

use crate::guard::PROXY_PATH;

/// Local asset prefixes served directly, never proxied.
pub const LOCAL_PREFIXES: &[&str] = &["/uploads/", "/attached_assets/"];

/// Options for [`build_image_url`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageUrlOptions {
    /// Ask the proxy for a WebP variant (`fmt=webp`)
    pub webp: bool,
}

impl ImageUrlOptions {
    pub fn webp() -> Self {
        Self { webp: true }
    }
}

/// Rewrites an absolute `http(s)://` image URL into a proxy URL.
///
/// Local uploads, attached assets, already-proxied URLs and anything that is not
/// an absolute http(s) URL are returned unchanged.
pub fn build_image_url(raw: &str, opts: ImageUrlOptions) -> String {
    if raw.is_empty()
        || LOCAL_PREFIXES.iter().any(|prefix| raw.starts_with(prefix))
        || raw.contains(PROXY_PATH)
    {
        return raw.to_string();
    }

    if !is_absolute_http(raw) {
        return raw.to_string();
    }

    let encoded: String = form_urlencoded::byte_serialize(raw.as_bytes()).collect();
    let mut rewritten = format!("{PROXY_PATH}?u={encoded}");
    if opts.webp {
        rewritten.push_str("&fmt=webp");
    }
    rewritten
}

fn is_absolute_http(raw: &str) -> bool {
    let prefix = |p: &str| {
        raw.get(..p.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(p))
    };
    prefix("http://") || prefix("https://")
}
