//! Proxy Statistics Module
//!
//! Tracks cache hits, misses, upstream fetches and failures.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Proxy Stats ==
/// Lock-free counters shared by every request.
#[derive(Debug, Default)]
pub struct ProxyStats {
    hits: AtomicU64,
    misses: AtomicU64,
    upstream_fetches: AtomicU64,
    store_failures: AtomicU64,
    rejections: AtomicU64,
}

/// Point-in-time copy of [`ProxyStats`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    /// Requests served from disk
    pub hits: u64,
    /// Requests that found no cache entry
    pub misses: u64,
    /// Outbound GETs issued
    pub upstream_fetches: u64,
    /// Fetched images that could not be persisted
    pub store_failures: u64,
    /// Requests refused by the classifier
    pub rejections: u64,
}

impl ProxyStats {
    // == Constructor ==
    /// Creates a new ProxyStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch(&self) {
        self.upstream_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_failure(&self) {
        self.store_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejection(&self) {
        self.rejections.fetch_add(1, Ordering::Relaxed);
    }

    // == Snapshot ==
    /// Returns the current counter values.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            upstream_fetches: self.upstream_fetches.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
