//! Cache Key Module
//!
//! Content addressing: a source URL maps to a fixed-length hex digest.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::cache::KEY_LENGTH;

// == Cache Key ==
/// Hex digest naming a cache entry on disk.
///
/// A pure function of the URL string: no salt, no time component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derives the key for an exact URL string.
    pub fn for_url(url: &str) -> Self {
        let digest = Sha256::digest(url.as_bytes());
        let mut hex = hex::encode(digest);
        hex.truncate(KEY_LENGTH);
        Self(hex)
    }

    /// The key as a file name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives the cache key of `url`.
pub fn key_for(url: &str) -> CacheKey {
    CacheKey::for_url(url)
}
