//! In-memory cache provider
//!
//! Uses `DashMap` for concurrent access with minimal lock contention and
//! evicts least-recently-used entries once the entry or byte limit is
//! reached. Entries hold `bytes::Bytes` so hits are zero-copy.

use crate::{
    config::MemoryCacheConfig,
    error::{CacheError, CacheResult},
    key::CacheKey,
    metadata::{CachedResponse, ResponseMetadata},
    stats::{AtomicCacheMetrics, CacheStats},
    traits::CacheProvider,
};
use bytes::Bytes;
use dashmap::DashMap;
use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::Instant,
};

#[derive(Debug)]
struct MemoryEntry {
    data: Bytes,
    metadata: ResponseMetadata,
    expires_at: Option<Instant>,
    /// Logical clock value of the last access, for LRU ordering
    last_accessed: AtomicU64,
}

impl MemoryEntry {
    fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires| Instant::now() >= expires)
    }

    fn size_bytes(&self) -> usize {
        self.data.len()
    }
}

/// Bounded in-memory cache provider
pub struct MemoryCache {
    storage: DashMap<CacheKey, Arc<MemoryEntry>>,
    config: MemoryCacheConfig,
    entry_count: AtomicUsize,
    memory_usage: AtomicUsize,
    /// Monotonic access counter; wall-clock time is too coarse for LRU
    clock: AtomicU64,
    metrics: AtomicCacheMetrics,
}

impl MemoryCache {
    pub fn new(config: MemoryCacheConfig) -> CacheResult<Self> {
        config
            .validate()
            .map_err(CacheError::InvalidConfiguration)?;

        Ok(Self {
            storage: DashMap::with_capacity(config.max_entries.min(1024)),
            config,
            entry_count: AtomicUsize::new(0),
            memory_usage: AtomicUsize::new(0),
            clock: AtomicU64::new(0),
            metrics: AtomicCacheMetrics::new(),
        })
    }

    pub fn config(&self) -> &MemoryCacheConfig {
        &self.config
    }

    /// Bytes currently held
    pub fn memory_usage(&self) -> usize {
        self.memory_usage.load(Ordering::Relaxed)
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn needs_eviction(&self, incoming_bytes: usize) -> bool {
        self.entry_count.load(Ordering::Relaxed) >= self.config.max_entries
            || self.config.max_memory_bytes.is_some_and(|max| {
                self.memory_usage.load(Ordering::Relaxed) + incoming_bytes > max
            })
    }

    /// Evict least-recently-used entries until there is room for one more
    /// entry of `incoming_bytes`. Entry count is brought down to 90% of
    /// capacity so a full cache does not evict on every store.
    fn evict_lru(&self, incoming_bytes: usize) {
        let target_entries = ((self.config.max_entries * 90) / 100).min(self.config.max_entries - 1);

        let mut candidates: Vec<(CacheKey, u64)> = self
            .storage
            .iter()
            .map(|entry| {
                (
                    entry.key().clone(),
                    entry.value().last_accessed.load(Ordering::Relaxed),
                )
            })
            .collect();
        candidates.sort_by_key(|(_, last_accessed)| *last_accessed);

        for (key, _) in candidates {
            let entries_ok = self.entry_count.load(Ordering::Relaxed) <= target_entries;
            let bytes_ok = self.config.max_memory_bytes.is_none_or(|max| {
                self.memory_usage.load(Ordering::Relaxed) + incoming_bytes <= max
            });
            if entries_ok && bytes_ok {
                break;
            }

            if self.remove_entry(&key) {
                self.metrics.record_eviction();
                tracing::trace!(key = %key, "evicted cache entry");
            }
        }
    }

    fn remove_entry(&self, key: &CacheKey) -> bool {
        if let Some((_, entry)) = self.storage.remove(key) {
            self.entry_count.fetch_sub(1, Ordering::Relaxed);
            self.memory_usage
                .fetch_sub(entry.size_bytes(), Ordering::Relaxed);
            true
        } else {
            false
        }
    }
}

impl CacheProvider for MemoryCache {
    fn lookup(&self, key: &CacheKey) -> Option<CachedResponse> {
        let Some(entry) = self.storage.get(key) else {
            self.metrics.record_lookup(false);
            return None;
        };

        if entry.is_expired() {
            // Guard must be dropped before removing from the same shard
            drop(entry);
            if self.remove_entry(key) {
                self.metrics.record_expiration();
            }
            self.metrics.record_lookup(false);
            return None;
        }

        entry.last_accessed.store(self.tick(), Ordering::Relaxed);
        let hit = CachedResponse {
            data: entry.data.clone(),
            metadata: entry.metadata.clone(),
        };
        self.metrics.record_lookup(true);
        Some(hit)
    }

    fn store(&self, key: CacheKey, data: Bytes, metadata: ResponseMetadata) -> CacheResult<()> {
        let size_bytes = data.len();
        if let Some(limit) = self.config.max_memory_bytes
            && size_bytes > limit
        {
            return Err(CacheError::EntryTooLarge {
                size: size_bytes,
                limit,
            });
        }

        // Replacing an entry must not count against the limits twice
        self.remove_entry(&key);

        if self.needs_eviction(size_bytes) {
            self.evict_lru(size_bytes);
        }

        let entry = Arc::new(MemoryEntry {
            data,
            metadata,
            expires_at: self.config.default_ttl.map(|ttl| Instant::now() + ttl),
            last_accessed: AtomicU64::new(self.tick()),
        });

        if let Some(old) = self.storage.insert(key, entry) {
            // Lost a race with a concurrent store of the same key
            self.memory_usage
                .fetch_sub(old.size_bytes(), Ordering::Relaxed);
        } else {
            self.entry_count.fetch_add(1, Ordering::Relaxed);
        }
        self.memory_usage.fetch_add(size_bytes, Ordering::Relaxed);

        self.metrics.record_store();
        Ok(())
    }

    fn remove(&self, key: &CacheKey) -> bool {
        let removed = self.remove_entry(key);
        if removed {
            self.metrics.record_remove();
        }
        removed
    }

    fn clear(&self) -> CacheResult<()> {
        self.storage.clear();
        self.entry_count.store(0, Ordering::Relaxed);
        self.memory_usage.store(0, Ordering::Relaxed);
        self.metrics.reset();
        Ok(())
    }

    fn len(&self) -> usize {
        self.entry_count.load(Ordering::Relaxed)
    }

    fn stats(&self) -> CacheStats {
        self.metrics.snapshot(self.len(), self.memory_usage())
    }
}
