//! The cache provider capability set
//!
//! The request layer only ever calls [`CacheProvider::lookup`] before
//! dispatch and [`CacheProvider::store`] after a successful response.
//! Eviction, expiry and persistence are left to each implementation.

use crate::{
    error::CacheResult,
    key::CacheKey,
    metadata::{CachedResponse, ResponseMetadata},
    stats::CacheStats,
};
use bytes::Bytes;

/// Key to cached-response store.
///
/// Implementations must be cheap to call from any thread: `lookup` runs on
/// the caller's thread before a request is dispatched and `store` runs on a
/// transport worker right before the result is handed to the delivery
/// context.
pub trait CacheProvider: Send + Sync {
    /// Returns `None` on a miss, for expired entries and when the backing
    /// store cannot be read.
    fn lookup(&self, key: &CacheKey) -> Option<CachedResponse>;

    fn store(&self, key: CacheKey, data: Bytes, metadata: ResponseMetadata) -> CacheResult<()>;

    /// Returns true if the key was present and removed.
    fn remove(&self, key: &CacheKey) -> bool;

    fn clear(&self) -> CacheResult<()>;

    /// Entry count, not byte size.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn stats(&self) -> CacheStats;
}
