//! Fetch-and-Persist Pipeline
//!
//! Serves an allowed URL from the disk cache, or fetches, validates and
//! persists it on a miss.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{key_for, CacheKey, DiskCache, Lookup, ProxyStats};
use crate::error::{FetchError, StoreError};
use crate::fetch::inflight::InFlight;
use crate::fetch::sniff::{image_content_type, sniff_image, OCTET_STREAM};
use crate::fetch::upstream::Upstream;

/// Where a served image came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOrigin {
    /// Read from an existing cache entry
    Cache,
    /// Fetched from upstream for this request
    Upstream,
}

/// An image ready to be served.
#[derive(Debug, Clone)]
pub struct CachedImage {
    pub bytes: Bytes,
    pub content_type: String,
    pub origin: CacheOrigin,
    /// Entry on disk; `None` when the fetched image could not be persisted
    pub path: Option<PathBuf>,
}

type FetchResult = Result<CachedImage, FetchError>;

// == Fetch Pipeline ==
pub struct FetchPipeline {
    store: Arc<DiskCache>,
    upstream: Arc<dyn Upstream>,
    stats: Arc<ProxyStats>,
    in_flight: Option<InFlight<FetchResult>>,
}

impl FetchPipeline {
    pub fn new(
        store: Arc<DiskCache>,
        upstream: Arc<dyn Upstream>,
        stats: Arc<ProxyStats>,
        dedupe_in_flight: bool,
    ) -> Self {
        Self {
            store,
            upstream,
            stats,
            in_flight: dedupe_in_flight.then(InFlight::new),
        }
    }

    /// The cache this pipeline fills.
    pub fn store(&self) -> &DiskCache {
        &self.store
    }

    // == Fetch And Cache ==
    /// Returns the image for an already-allowed `url`.
    ///
    /// A present cache entry is served without any network access. A failed
    /// cache write still returns the fetched image, just without a path.
    pub async fn fetch_and_cache(&self, url: &Url) -> FetchResult {
        let key = key_for(url.as_str());

        if let Some(image) = self.from_cache(&key).await {
            self.stats.record_hit();
            return Ok(image);
        }
        self.stats.record_miss();

        match &self.in_flight {
            Some(in_flight) => {
                let key_ref = &key;
                in_flight
                    .run(key_ref, move || self.fetch_and_store(url, key_ref))
                    .await
            }
            None => self.fetch_and_store(url, &key).await,
        }
    }

    async fn from_cache(&self, key: &CacheKey) -> Option<CachedImage> {
        let Lookup::Present(path) = self.store.lookup(key).await else {
            return None;
        };

        match self.store.read(&path).await {
            Ok(bytes) => {
                debug!(key = %key, size = bytes.len(), "Cache hit");
                let content_type = match self.store.content_type(key).await {
                    Some(recorded) => recorded,
                    None => sniff_image(&bytes).unwrap_or(OCTET_STREAM).to_string(),
                };
                Some(CachedImage {
                    bytes,
                    content_type,
                    origin: CacheOrigin::Cache,
                    path: Some(path),
                })
            }
            Err(e) => {
                // Entry vanished between lookup and read; refetch
                warn!(key = %key, error = %e, "Failed to read cache entry");
                None
            }
        }
    }

    async fn fetch_and_store(&self, url: &Url, key: &CacheKey) -> FetchResult {
        // A concurrent request may have finished the same fetch already
        if self.in_flight.is_some() {
            if let Some(image) = self.from_cache(key).await {
                return Ok(image);
            }
        }

        info!(key = %key, url = %url, "Fetching image from upstream");
        self.stats.record_fetch();
        let response = self.upstream.get(url).await?;

        if response.bytes.is_empty() {
            return Err(FetchError::InvalidContent("empty body".to_string()));
        }
        let content_type = image_content_type(response.content_type.as_deref(), &response.bytes)
            .ok_or_else(|| FetchError::InvalidContent("not an image".to_string()))?;

        let path = match self.persist(key, &response.bytes, &content_type).await {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to persist image, serving uncached");
                self.stats.record_store_failure();
                None
            }
        };

        Ok(CachedImage {
            bytes: response.bytes,
            content_type,
            origin: CacheOrigin::Upstream,
            path,
        })
    }

    /// Persists the type record, then the entry.
    async fn persist(
        &self,
        key: &CacheKey,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<PathBuf, StoreError> {
        self.store.store_content_type(key, content_type).await?;
        self.store.store(key, bytes).await
    }
}
