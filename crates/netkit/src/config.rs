//! Configuration for the network facade

use netkit_cache::{
    CacheProvider, DiskCache, DiskCacheConfig, MemoryCache, MemoryCacheConfig, NoopCache,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::SetupError;
use crate::network::CachePolicy;
use crate::validation::StatusValidation;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Threads driving the transport runtime
    pub worker_threads: usize,

    pub connect_timeout: Duration,

    /// Whole exchange, including the body
    pub request_timeout: Duration,

    pub pool_idle_timeout: Duration,
    pub pool_max_idle_per_host: usize,

    pub user_agent: String,
    pub max_redirects: usize,

    /// Accept gzip, brotli and deflate encoded bodies
    pub enable_compression: bool,

    pub cache: CacheConfig,

    /// Default policy for requests that don't pass their own
    pub cache_policy: CachePolicy,

    /// Status codes handed to the parser
    pub acceptable_status: StatusValidation,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            worker_threads: 2,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
            pool_idle_timeout: Duration::from_secs(90),
            pool_max_idle_per_host: 10,
            user_agent: concat!("netkit/", env!("CARGO_PKG_VERSION")).to_string(),
            max_redirects: 10,
            enable_compression: true,
            cache: CacheConfig::default(),
            cache_policy: CachePolicy::default(),
            acceptable_status: StatusValidation::default(),
        }
    }
}

impl NetworkConfig {
    /// Defaults overridden by `NETKIT_*` environment variables.
    ///
    /// Unparsable values fall back to the default for that field.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |name: &str| lookup(name).and_then(|s| s.trim().parse::<u64>().ok());
        let secs = |name: &str, default: Duration| {
            parsed(name).map_or(default, Duration::from_secs)
        };
        let count = |name: &str, default: usize| parsed(name).map_or(default, |v| v as usize);

        Self {
            worker_threads: count("NETKIT_WORKER_THREADS", defaults.worker_threads),
            connect_timeout: secs("NETKIT_CONNECT_TIMEOUT", defaults.connect_timeout),
            request_timeout: secs("NETKIT_REQUEST_TIMEOUT", defaults.request_timeout),
            pool_idle_timeout: secs("NETKIT_POOL_IDLE_TIMEOUT", defaults.pool_idle_timeout),
            pool_max_idle_per_host: count(
                "NETKIT_POOL_MAX_IDLE_PER_HOST",
                defaults.pool_max_idle_per_host,
            ),
            user_agent: lookup("NETKIT_USER_AGENT").unwrap_or(defaults.user_agent),
            max_redirects: count("NETKIT_MAX_REDIRECTS", defaults.max_redirects),
            enable_compression: defaults.enable_compression,
            cache: CacheConfig::from_lookup(&lookup),
            cache_policy: defaults.cache_policy,
            acceptable_status: defaults.acceptable_status,
        }
    }

    /// Small pools and a small in-memory cache
    pub fn memory_optimized() -> Self {
        Self {
            worker_threads: 1,
            pool_max_idle_per_host: 2,
            cache: CacheConfig::memory_optimized(),
            ..Self::default()
        }
    }

    /// More workers and connections for many concurrent requests
    pub fn high_throughput() -> Self {
        Self {
            worker_threads: 8,
            pool_max_idle_per_host: 64,
            cache: CacheConfig {
                memory_max_entries: 10_000,
                memory_max_size_bytes: 256 * 1024 * 1024,
                ..CacheConfig::default()
            },
            ..Self::default()
        }
    }

    /// No response caching at all
    pub fn without_cache(mut self) -> Self {
        self.cache.enabled = false;
        self
    }
}

/// Which cache provider the facade builds and how it is bounded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// When false the facade uses [`NoopCache`]
    pub enabled: bool,

    /// Persist to this directory instead of memory
    pub dir: Option<PathBuf>,

    pub memory_max_entries: usize,
    pub memory_max_size_bytes: usize,

    pub disk_max_files: usize,
    pub disk_max_size_bytes: usize,

    /// Entries older than this are treated as misses. `None` keeps them
    /// until evicted.
    pub ttl: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            memory_max_entries: 1000,
            memory_max_size_bytes: 32 * 1024 * 1024,
            disk_max_files: 10_000,
            disk_max_size_bytes: 512 * 1024 * 1024,
            ttl: None,
        }
    }
}

impl CacheConfig {
    fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |name: &str| lookup(name).and_then(|s| s.trim().parse::<u64>().ok());

        Self {
            enabled: lookup("NETKIT_CACHE_DISABLED")
                .is_none_or(|v| !matches!(v.trim(), "1" | "true" | "yes")),
            dir: lookup("NETKIT_CACHE_DIR").map(PathBuf::from),
            memory_max_entries: parsed("NETKIT_CACHE_MAX_ENTRIES")
                .map_or(defaults.memory_max_entries, |v| v as usize),
            memory_max_size_bytes: parsed("NETKIT_CACHE_MAX_SIZE")
                .map_or(defaults.memory_max_size_bytes, |v| v as usize),
            disk_max_files: parsed("NETKIT_CACHE_MAX_FILES")
                .map_or(defaults.disk_max_files, |v| v as usize),
            disk_max_size_bytes: parsed("NETKIT_CACHE_DISK_MAX_SIZE")
                .map_or(defaults.disk_max_size_bytes, |v| v as usize),
            ttl: parsed("NETKIT_CACHE_TTL").map(Duration::from_secs),
        }
    }

    pub fn memory_optimized() -> Self {
        Self {
            memory_max_entries: 100,
            memory_max_size_bytes: 4 * 1024 * 1024,
            ..Self::default()
        }
    }

    /// Build the provider described by this config
    pub fn build_provider(&self) -> Result<Arc<dyn CacheProvider>, SetupError> {
        if !self.enabled {
            return Ok(Arc::new(NoopCache::new()));
        }

        if let Some(dir) = &self.dir {
            let mut config = DiskCacheConfig::new(dir.clone())
                .with_max_files(self.disk_max_files)
                .with_max_disk_usage(self.disk_max_size_bytes);
            if let Some(ttl) = self.ttl {
                config = config.with_default_ttl(ttl);
            }
            return Ok(Arc::new(DiskCache::new(config)?));
        }

        let mut config = MemoryCacheConfig::new()
            .with_max_entries(self.memory_max_entries)
            .with_max_memory(self.memory_max_size_bytes);
        if let Some(ttl) = self.ttl {
            config = config.with_default_ttl(ttl);
        }
        Ok(Arc::new(MemoryCache::new(config)?))
    }
}
