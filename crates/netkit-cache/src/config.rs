//! Cache configuration structures
//!
//! Each provider has its own configuration with sensible defaults and
//! validation.

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Memory cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryCacheConfig {
    /// Maximum number of entries in the cache
    pub max_entries: usize,
    /// Maximum memory usage in bytes (None for unlimited)
    pub max_memory_bytes: Option<usize>,
    /// TTL applied to every entry (None for no expiration)
    pub default_ttl: Option<Duration>,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1_000,
            max_memory_bytes: Some(32 * 1024 * 1024), // 32 MB
            default_ttl: None,
        }
    }
}

impl MemoryCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_max_memory(mut self, max_bytes: usize) -> Self {
        self.max_memory_bytes = Some(max_bytes);
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_entries == 0 {
            return Err("max_entries must be greater than 0".to_string());
        }

        if let Some(max_bytes) = self.max_memory_bytes
            && max_bytes == 0
        {
            return Err("max_memory_bytes must be greater than 0".to_string());
        }

        if self.default_ttl.is_some_and(|ttl| ttl.is_zero()) {
            return Err("default_ttl must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// Disk cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskCacheConfig {
    /// Base directory for cache storage
    pub cache_dir: PathBuf,
    /// Maximum number of entries kept on disk
    pub max_files: usize,
    /// Maximum disk usage in bytes (None for unlimited)
    pub max_disk_bytes: Option<usize>,
    /// TTL applied to every entry (None for no expiration)
    pub default_ttl: Option<Duration>,
}

impl DiskCacheConfig {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            max_files: 10_000,
            max_disk_bytes: Some(512 * 1024 * 1024), // 512 MB
            default_ttl: None,
        }
    }

    pub fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = max_files;
        self
    }

    pub fn with_max_disk_usage(mut self, max_bytes: usize) -> Self {
        self.max_disk_bytes = Some(max_bytes);
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.cache_dir.as_os_str().is_empty() {
            return Err("cache_dir must not be empty".to_string());
        }

        if self.max_files == 0 {
            return Err("max_files must be greater than 0".to_string());
        }

        if let Some(max_bytes) = self.max_disk_bytes
            && max_bytes == 0
        {
            return Err("max_disk_bytes must be greater than 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_config_validation() {
        assert!(MemoryCacheConfig::default().validate().is_ok());
        assert!(
            MemoryCacheConfig::new()
                .with_max_entries(0)
                .validate()
                .is_err()
        );
        assert!(MemoryCacheConfig::new().with_max_memory(0).validate().is_err());
        assert!(
            MemoryCacheConfig::new()
                .with_default_ttl(Duration::ZERO)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_disk_config_validation() {
        assert!(DiskCacheConfig::new("/tmp/netkit").validate().is_ok());
        assert!(DiskCacheConfig::new("").validate().is_err());
        assert!(
            DiskCacheConfig::new("/tmp/netkit")
                .with_max_files(0)
                .validate()
                .is_err()
        );
    }
}
