//! Cache statistics and metrics types

#![allow(clippy::cast_precision_loss)] // Statistics calculations intentionally accept precision loss

use std::sync::atomic::{AtomicU64, Ordering};

/// Cache statistics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hit_count: u64,
    pub miss_count: u64,
    pub store_count: u64,
    pub remove_count: u64,
    pub eviction_count: u64,
    pub expiration_count: u64,
    pub entry_count: usize,
    /// Bytes held in memory or on disk, depending on the provider
    pub size_bytes: usize,
}

impl CacheStats {
    /// Hit rate as a percentage of all lookups
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hit_count + self.miss_count;
        if lookups == 0 {
            0.0
        } else {
            (self.hit_count as f64) / (lookups as f64) * 100.0
        }
    }

    pub fn lookup_count(&self) -> u64 {
        self.hit_count + self.miss_count
    }
}

/// Lock-free counters shared by the cache providers
#[derive(Debug, Default)]
pub struct AtomicCacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
    removes: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl AtomicCacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_lookup(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_store(&self) {
        self.stores.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_remove(&self) {
        self.removes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_expiration(&self) {
        self.expirations.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of the counters; entry count and size come from the provider
    pub fn snapshot(&self, entry_count: usize, size_bytes: usize) -> CacheStats {
        CacheStats {
            hit_count: self.hits.load(Ordering::Relaxed),
            miss_count: self.misses.load(Ordering::Relaxed),
            store_count: self.stores.load(Ordering::Relaxed),
            remove_count: self.removes.load(Ordering::Relaxed),
            eviction_count: self.evictions.load(Ordering::Relaxed),
            expiration_count: self.expirations.load(Ordering::Relaxed),
            entry_count,
            size_bytes,
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.stores,
            &self.removes,
            &self.evictions,
            &self.expirations,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
