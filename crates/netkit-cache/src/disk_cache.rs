//! Disk-backed cache provider for persistent response storage
//!
//! Every entry is two files named after the key digest: `<digest>.bin` with
//! the raw body and `<digest>.json` with a [`DiskRecord`]. Files are written
//! under a temporary name and renamed into place so readers never observe a
//! half-written entry. An in-memory index, rebuilt from the metadata files
//! on startup, answers misses without touching the filesystem.
#![allow(clippy::significant_drop_tightening)] // index lock is held across file ops for atomicity

use crate::{
    config::DiskCacheConfig,
    error::{CacheError, CacheResult},
    key::CacheKey,
    metadata::{CachedResponse, ResponseMetadata, now_ms},
    stats::{AtomicCacheMetrics, CacheStats},
    traits::CacheProvider,
};
use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

const DATA_EXTENSION: &str = "bin";
const META_EXTENSION: &str = "json";

/// Metadata file contents
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DiskRecord {
    key: String,
    size_bytes: usize,
    metadata: ResponseMetadata,
}

#[derive(Debug, Clone)]
struct IndexEntry {
    size_bytes: usize,
    stored_at_ms: u64,
}

/// Persistent cache provider backed by a directory of files
pub struct DiskCache {
    config: DiskCacheConfig,
    /// digest -> entry
    index: RwLock<HashMap<String, IndexEntry>>,
    metrics: AtomicCacheMetrics,
}

impl DiskCache {
    /// Open (or create) a cache directory and index its existing entries
    pub fn new(config: DiskCacheConfig) -> CacheResult<Self> {
        config
            .validate()
            .map_err(CacheError::InvalidConfiguration)?;

        fs::create_dir_all(&config.cache_dir)?;

        let cache = Self {
            config,
            index: RwLock::new(HashMap::new()),
            metrics: AtomicCacheMetrics::new(),
        };
        cache.rebuild_index()?;
        Ok(cache)
    }

    pub fn config(&self) -> &DiskCacheConfig {
        &self.config
    }

    /// Bytes of response data currently on disk
    pub fn disk_usage(&self) -> usize {
        self.index.read().values().map(|e| e.size_bytes).sum()
    }

    fn data_path(&self, digest: &str) -> PathBuf {
        self.config
            .cache_dir
            .join(format!("{digest}.{DATA_EXTENSION}"))
    }

    fn meta_path(&self, digest: &str) -> PathBuf {
        self.config
            .cache_dir
            .join(format!("{digest}.{META_EXTENSION}"))
    }

    fn rebuild_index(&self) -> CacheResult<()> {
        let mut index = self.index.write();
        index.clear();

        for dir_entry in fs::read_dir(&self.config.cache_dir)? {
            let path = dir_entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(META_EXTENSION) {
                continue;
            }
            let Some(digest) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            match read_record(&path) {
                Ok(record) if self.data_path(digest).exists() => {
                    index.insert(
                        digest.to_string(),
                        IndexEntry {
                            size_bytes: record.size_bytes,
                            stored_at_ms: record.metadata.stored_at_ms,
                        },
                    );
                }
                Ok(_) => {
                    tracing::debug!(path = %path.display(), "dropping metadata without body");
                    let _ = fs::remove_file(&path);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "unreadable cache metadata");
                    let _ = fs::remove_file(&path);
                    let _ = fs::remove_file(self.data_path(digest));
                }
            }
        }

        tracing::debug!(
            dir = %self.config.cache_dir.display(),
            entries = index.len(),
            "disk cache index rebuilt"
        );
        Ok(())
    }

    fn is_expired(&self, stored_at_ms: u64) -> bool {
        self.config.default_ttl.is_some_and(|ttl| {
            now_ms().saturating_sub(stored_at_ms) >= ttl.as_millis() as u64
        })
    }

    fn read_entry(&self, key: &CacheKey, digest: &str) -> CacheResult<CachedResponse> {
        let record = read_record(&self.meta_path(digest))?;
        if record.key != key.as_str() {
            return Err(CacheError::Corruption(format!(
                "digest {digest} holds key {:?}",
                record.key
            )));
        }

        let data = fs::read(self.data_path(digest))?;
        if data.len() != record.size_bytes {
            return Err(CacheError::Corruption(format!(
                "expected {} bytes for {digest}, found {}",
                record.size_bytes,
                data.len()
            )));
        }

        Ok(CachedResponse {
            data: Bytes::from(data),
            metadata: record.metadata,
        })
    }

    /// Drop `digest` unless it was rewritten after `stored_at_ms` was read
    fn remove_if_unchanged(&self, digest: &str, stored_at_ms: u64) -> bool {
        let mut index = self.index.write();
        if index
            .get(digest)
            .is_none_or(|entry| entry.stored_at_ms != stored_at_ms)
        {
            return false;
        }
        index.remove(digest);
        self.delete_files(digest);
        true
    }

    fn delete_files(&self, digest: &str) {
        let _ = fs::remove_file(self.data_path(digest));
        let _ = fs::remove_file(self.meta_path(digest));
    }

    /// Oldest-first eviction until one more entry of `incoming` bytes fits
    fn evict(&self, index: &mut HashMap<String, IndexEntry>, incoming: usize) {
        let mut candidates: Vec<(String, u64)> = index
            .iter()
            .map(|(digest, entry)| (digest.clone(), entry.stored_at_ms))
            .collect();
        candidates.sort_by_key(|(_, stored_at)| *stored_at);

        for (digest, _) in candidates {
            let files_ok = index.len() < self.config.max_files;
            let bytes_ok = self.config.max_disk_bytes.is_none_or(|max| {
                index.values().map(|e| e.size_bytes).sum::<usize>() + incoming <= max
            });
            if files_ok && bytes_ok {
                break;
            }

            index.remove(&digest);
            self.delete_files(&digest);
            self.metrics.record_eviction();
        }
    }
}

impl CacheProvider for DiskCache {
    fn lookup(&self, key: &CacheKey) -> Option<CachedResponse> {
        let digest = key.digest();

        // Files are read under the index lock so a concurrent store of the
        // same key cannot swap them mid-read
        let (stored_at_ms, outcome) = {
            let index = self.index.read();
            let Some(entry) = index.get(&digest) else {
                self.metrics.record_lookup(false);
                return None;
            };
            let stored_at_ms = entry.stored_at_ms;
            if self.is_expired(stored_at_ms) {
                (stored_at_ms, None)
            } else {
                (stored_at_ms, Some(self.read_entry(key, &digest)))
            }
        };

        match outcome {
            Some(Ok(hit)) => {
                self.metrics.record_lookup(true);
                Some(hit)
            }
            Some(Err(e)) => {
                tracing::warn!(key = %key, error = %e, "dropping unreadable cache entry");
                self.remove_if_unchanged(&digest, stored_at_ms);
                self.metrics.record_lookup(false);
                None
            }
            None => {
                if self.remove_if_unchanged(&digest, stored_at_ms) {
                    self.metrics.record_expiration();
                }
                self.metrics.record_lookup(false);
                None
            }
        }
    }

    fn store(&self, key: CacheKey, data: Bytes, metadata: ResponseMetadata) -> CacheResult<()> {
        let size_bytes = data.len();
        if let Some(limit) = self.config.max_disk_bytes
            && size_bytes > limit
        {
            return Err(CacheError::EntryTooLarge {
                size: size_bytes,
                limit,
            });
        }

        let digest = key.digest();
        let record = DiskRecord {
            key: key.as_str().to_string(),
            size_bytes,
            metadata,
        };
        let stored_at_ms = record.metadata.stored_at_ms;

        let mut index = self.index.write();
        index.remove(&digest);
        self.evict(&mut index, size_bytes);

        write_atomic(&self.data_path(&digest), &data)?;
        write_atomic(&self.meta_path(&digest), &serde_json::to_vec(&record)?)?;

        index.insert(
            digest,
            IndexEntry {
                size_bytes,
                stored_at_ms,
            },
        );
        self.metrics.record_store();
        tracing::trace!(key = %key, size_bytes, "stored cache entry on disk");
        Ok(())
    }

    fn remove(&self, key: &CacheKey) -> bool {
        let digest = key.digest();
        let removed = self.index.write().remove(&digest).is_some();
        if removed {
            self.delete_files(&digest);
            self.metrics.record_remove();
        }
        removed
    }

    fn clear(&self) -> CacheResult<()> {
        let mut index = self.index.write();
        for digest in index.keys() {
            self.delete_files(digest);
        }
        index.clear();
        self.metrics.reset();
        Ok(())
    }

    fn len(&self) -> usize {
        self.index.read().len()
    }

    fn stats(&self) -> CacheStats {
        self.metrics.snapshot(self.len(), self.disk_usage())
    }
}

fn read_record(path: &Path) -> CacheResult<DiskRecord> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn write_atomic(path: &Path, contents: &[u8]) -> CacheResult<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tempfile::TempDir;

    fn key(url: &str) -> CacheKey {
        CacheKey::new("GET", url, std::iter::empty())
    }

    fn open(dir: &TempDir) -> DiskCache {
        DiskCache::new(DiskCacheConfig::new(dir.path())).expect("cache should open")
    }

    #[test]
    fn test_store_and_lookup() {
        let dir = TempDir::new().expect("tempdir");
        let cache = open(&dir);

        cache
            .store(
                key("https://x/get"),
                Bytes::from_static(b"{\"url\":\"https://x/get\"}"),
                ResponseMetadata::new(200),
            )
            .expect("store");

        let hit = cache.lookup(&key("https://x/get")).expect("hit");
        assert_eq!(hit.data.as_ref(), b"{\"url\":\"https://x/get\"}");
        assert_eq!(hit.metadata.status, 200);
        assert!(cache.lookup(&key("https://x/other")).is_none());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.disk_usage(), 23);
    }

    #[test]
    fn test_entries_survive_reopen() {
        let dir = TempDir::new().expect("tempdir");
        {
            let cache = open(&dir);
            cache
                .store(key("a"), Bytes::from_static(b"persisted"), ResponseMetadata::new(203))
                .expect("store");
        }

        let cache = open(&dir);
        assert_eq!(cache.len(), 1);
        let hit = cache.lookup(&key("a")).expect("hit after reopen");
        assert_eq!(hit.data.as_ref(), b"persisted");
        assert_eq!(hit.metadata.status, 203);
    }

    #[test]
    fn test_metadata_survives_reopen() {
        let dir = TempDir::new().expect("tempdir");
        let metadata = ResponseMetadata::new(200)
            .with_header("content-type", "application/json")
            .with_header("etag", "\"abc\"");
        open(&dir)
            .store(key("a"), Bytes::from_static(b"{}"), metadata.clone())
            .expect("store");

        let hit = open(&dir).lookup(&key("a")).expect("hit after reopen");
        assert_eq!(hit.metadata, metadata);
    }

    #[test]
    fn test_lookup_during_rewrites_keeps_the_entry() {
        let dir = TempDir::new().expect("tempdir");
        let cache = open(&dir);
        cache
            .store(key("hot"), Bytes::from_static(b"0"), ResponseMetadata::new(200))
            .expect("store");

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for i in 1..100_usize {
                    let body = vec![b'a' + (i % 26) as u8; i % 17 + 1];
                    cache
                        .store(key("hot"), Bytes::from(body), ResponseMetadata::new(200))
                        .expect("store");
                }
            });
            scope.spawn(|| {
                for _ in 0..100 {
                    let hit = cache
                        .lookup(&key("hot"))
                        .expect("entry stays readable while it is rewritten");
                    assert!(hit.data.iter().all(|b| *b == hit.data[0]));
                }
            });
        });

        assert!(cache.lookup(&key("hot")).is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_corrupted_body_is_dropped() {
        let dir = TempDir::new().expect("tempdir");
        let cache = open(&dir);
        cache
            .store(key("a"), Bytes::from_static(b"12345"), ResponseMetadata::new(200))
            .expect("store");

        fs::write(dir.path().join(format!("{}.bin", key("a").digest())), b"12")
            .expect("overwrite body");

        assert!(cache.lookup(&key("a")).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_eviction_by_file_count() {
        let dir = TempDir::new().expect("tempdir");
        let cache = DiskCache::new(DiskCacheConfig::new(dir.path()).with_max_files(2))
            .expect("cache should open");

        for name in ["a", "b", "c"] {
            cache
                .store(key(name), Bytes::from_static(b"x"), ResponseMetadata::new(200))
                .expect("store");
            // stored_at has millisecond resolution
            std::thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(cache.len(), 2);
        assert!(cache.lookup(&key("a")).is_none());
        assert!(cache.lookup(&key("c")).is_some());
        assert_eq!(cache.stats().eviction_count, 1);
    }

    #[test]
    fn test_expired_entries_miss() {
        let dir = TempDir::new().expect("tempdir");
        let cache = DiskCache::new(
            DiskCacheConfig::new(dir.path()).with_default_ttl(Duration::from_millis(10)),
        )
        .expect("cache should open");
        cache
            .store(key("a"), Bytes::from_static(b"x"), ResponseMetadata::new(200))
            .expect("store");
        std::thread::sleep(Duration::from_millis(30));

        assert!(cache.lookup(&key("a")).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_remove_and_clear() {
        let dir = TempDir::new().expect("tempdir");
        let cache = open(&dir);
        cache
            .store(key("a"), Bytes::from_static(b"x"), ResponseMetadata::new(200))
            .expect("store");
        cache
            .store(key("b"), Bytes::from_static(b"y"), ResponseMetadata::new(200))
            .expect("store");

        assert!(cache.remove(&key("a")));
        assert!(!dir.path().join(format!("{}.bin", key("a").digest())).exists());

        cache.clear().expect("clear");
        assert!(cache.is_empty());
        let remaining = fs::read_dir(dir.path()).expect("read dir").count();
        assert_eq!(remaining, 0);
    }
}
