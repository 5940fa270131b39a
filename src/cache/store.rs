//! Disk Cache Store Module
//!
//! Content-addressed image storage. The store owns its root directory; entries
//! are written under a hidden temporary name and renamed into place, so a reader
//! either sees a complete entry or none at all.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::cache::{CacheKey, Lookup, PARTIAL_SUFFIX, TYPE_SUFFIX};
use crate::error::StoreError;

// == Disk Cache ==
/// On-disk cache rooted at one directory.
#[derive(Debug, Clone)]
pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    // == Constructor ==
    /// Opens (creating if needed) a cache rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        debug!(root = %root.display(), "Opened image cache");
        Ok(Self { root })
    }

    /// Root directory of the cache.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the entry named by `key`.
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.as_str())
    }

    /// Path of the content-type record kept beside the entry for `key`.
    pub fn type_path_for(&self, key: &CacheKey) -> PathBuf {
        self.root.join(format!("{}{}", key.as_str(), TYPE_SUFFIX))
    }

    // == Lookup ==
    /// Reports whether a complete entry exists for `key`. Does not read it.
    pub async fn lookup(&self, key: &CacheKey) -> Lookup {
        let path = self.path_for(key);
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {
                trace!(key = %key, "Cache entry present");
                Lookup::Present(path)
            }
            _ => {
                trace!(key = %key, "Cache entry absent");
                Lookup::Absent
            }
        }
    }

    // == Read ==
    /// Reads a whole entry previously returned by [`DiskCache::lookup`].
    pub async fn read(&self, path: &Path) -> io::Result<Bytes> {
        fs::read(path).await.map(Bytes::from)
    }

    // == Store ==
    /// Writes `bytes` as the entry for `key` and returns its path.
    ///
    /// Concurrent stores of the same key are allowed; the last rename wins.
    pub async fn store(&self, key: &CacheKey, bytes: &[u8]) -> Result<PathBuf, StoreError> {
        let dest = self.path_for(key);
        self.replace(key, &dest, bytes).await?;
        debug!(key = %key, size = bytes.len(), "Stored image in cache");
        Ok(dest)
    }

    /// Records the content type an entry was first served with.
    pub async fn store_content_type(
        &self,
        key: &CacheKey,
        content_type: &str,
    ) -> Result<PathBuf, StoreError> {
        let dest = self.type_path_for(key);
        self.replace(key, &dest, content_type.as_bytes()).await?;
        Ok(dest)
    }

    /// Content type recorded for `key`, if any.
    pub async fn content_type(&self, key: &CacheKey) -> Option<String> {
        let raw = fs::read_to_string(self.type_path_for(key)).await.ok()?;
        let content_type = raw.trim();
        (!content_type.is_empty()).then(|| content_type.to_string())
    }

    /// Writes `bytes` under a hidden temporary name, then renames it onto `dest`.
    async fn replace(&self, key: &CacheKey, dest: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        let tmp = self
            .root
            .join(format!(".{}.{}{}", key.as_str(), Uuid::new_v4().simple(), PARTIAL_SUFFIX));

        if let Err(e) = write_file(&tmp, bytes).await {
            discard(&tmp).await;
            return Err(e.into());
        }

        if let Err(e) = fs::rename(&tmp, dest).await {
            discard(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    // == Sweep Partials ==
    /// Removes temporary files older than `max_age`, left behind by
    /// interrupted writes. Returns the number removed.
    pub async fn sweep_partials(&self, max_age: Duration) -> io::Result<usize> {
        let now = SystemTime::now();
        let mut removed = 0;
        let mut entries = fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !(name.starts_with('.') && name.ends_with(PARTIAL_SUFFIX)) {
                continue;
            }

            let Ok(modified) = entry.metadata().await.and_then(|m| m.modified()) else {
                continue;
            };
            let age = now.duration_since(modified).unwrap_or_default();
            if age < max_age {
                continue;
            }

            match fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                // Renamed or removed by someone else meanwhile
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(file = name, error = %e, "Failed to remove partial cache file"),
            }
        }

        Ok(removed)
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await
}

async fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(file = %path.display(), error = %e, "Failed to remove partial cache file");
        }
    }
}
