//! Cache Module
//!
//! Content-addressed on-disk image cache and proxy statistics.

mod key;
mod stats;
mod store;


use std::path::PathBuf;

// Re-export public types
pub use key::{key_for, CacheKey};
pub use stats::{ProxyStats, StatsSnapshot};
pub use store::DiskCache;

// == Public Constants ==
/// Length of a cache key in hex characters (128 bits of SHA-256)
pub const KEY_LENGTH: usize = 32;

/// Suffix of in-progress entry writes
pub const PARTIAL_SUFFIX: &str = ".part";

/// Suffix of the content-type record stored beside an entry
pub const TYPE_SUFFIX: &str = ".type";

/// Result of a cache lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Present(PathBuf),
    Absent,
}
