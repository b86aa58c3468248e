//! Pluggable response cache providers for the netkit HTTP request layer
//!
//! The request layer consults a [`CacheProvider`] before dispatching a call
//! and stores the raw body after a successful response. This crate defines
//! that capability set and ships three providers:
//!
//! - [`MemoryCache`]: bounded in-memory store with LRU eviction (the default)
//! - [`DiskCache`]: persistent store, one body file and one metadata file
//!   per entry
//! - [`NoopCache`]: never hits, for callers that want caching disabled
//!
//! Freshness is a provider concern: both real providers accept an optional
//! TTL, and nothing in the request layer enforces one.
//!
//! # Example
//!
//! ```rust
//! use bytes::Bytes;
//! use netkit_cache::{CacheKey, CacheProvider, MemoryCache, MemoryCacheConfig, ResponseMetadata};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = MemoryCache::new(MemoryCacheConfig::new().with_max_entries(100))?;
//! let key = CacheKey::new("GET", "https://example.com/get", std::iter::empty());
//!
//! cache.store(key.clone(), Bytes::from_static(b"{}"), ResponseMetadata::new(200))?;
//! assert!(cache.lookup(&key).is_some());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod disk_cache;
pub mod error;
pub mod key;
pub mod memory_cache;
pub mod metadata;
pub mod noop;
pub mod stats;
pub mod traits;

pub use config::{DiskCacheConfig, MemoryCacheConfig};
pub use disk_cache::DiskCache;
pub use error::{CacheError, CacheResult};
pub use key::CacheKey;
pub use memory_cache::MemoryCache;
pub use metadata::{CachedResponse, ResponseMetadata};
pub use noop::NoopCache;
pub use stats::CacheStats;
pub use traits::CacheProvider;
