//! Error types for cache operations

use thiserror::Error;

/// Errors that can occur during cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    /// Invalid cache configuration
    #[error("Invalid cache configuration: {0}")]
    InvalidConfiguration(String),

    /// IO error during cache operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Entry is larger than the provider will ever hold
    #[error("Entry of {size} bytes exceeds the {limit} byte limit")]
    EntryTooLarge { size: usize, limit: usize },

    /// On-disk entry does not match its metadata
    #[error("Cache corruption detected: {0}")]
    Corruption(String),
}

/// Result type for cache operations
pub type CacheResult<T> = std::result::Result<T, CacheError>;
