//! Response metadata stored next to cached bytes

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Minimal wire-level metadata kept with a cached body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub status: u16,
    /// Response headers worth replaying, as `(name, value)` pairs
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    /// Milliseconds since the unix epoch
    pub stored_at_ms: u64,
}

impl ResponseMetadata {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            stored_at_ms: now_ms(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Age of the entry in milliseconds, saturating at zero when the clock
    /// went backwards.
    pub fn age_ms(&self) -> u64 {
        now_ms().saturating_sub(self.stored_at_ms)
    }
}

/// A cache hit: the raw body and the metadata it was stored with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub data: Bytes,
    pub metadata: ResponseMetadata,
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
