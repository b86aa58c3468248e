//! Provider that never caches anything

use crate::{
    error::CacheResult,
    key::CacheKey,
    metadata::{CachedResponse, ResponseMetadata},
    stats::{AtomicCacheMetrics, CacheStats},
    traits::CacheProvider,
};
use bytes::Bytes;

/// Always misses and discards stores. Lookups and stores are still counted
/// so callers can observe how often the cache was consulted.
#[derive(Debug, Default)]
pub struct NoopCache {
    metrics: AtomicCacheMetrics,
}

impl NoopCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheProvider for NoopCache {
    fn lookup(&self, _key: &CacheKey) -> Option<CachedResponse> {
        self.metrics.record_lookup(false);
        None
    }

    fn store(&self, _key: CacheKey, _data: Bytes, _metadata: ResponseMetadata) -> CacheResult<()> {
        self.metrics.record_store();
        Ok(())
    }

    fn remove(&self, _key: &CacheKey) -> bool {
        false
    }

    fn clear(&self) -> CacheResult<()> {
        Ok(())
    }

    fn len(&self) -> usize {
        0
    }

    fn stats(&self) -> CacheStats {
        self.metrics.snapshot(0, 0)
    }
}
