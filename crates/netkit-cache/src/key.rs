//! Canonical request identity used as the cache key

use std::fmt;

/// Canonical identity of a request for caching purposes.
///
/// Rendered as `METHOD url` followed by `name=value` pairs for each vary
/// header, sorted by lowercase header name so that the same logical request
/// always produces the same key regardless of header insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build a key from a method, a URL and the `(name, value)` pairs of the
    /// headers the cache should vary on.
    pub fn new<'a, I>(method: &str, url: &str, vary: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut pairs: Vec<(String, &str)> = vary
            .into_iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value.trim()))
            .collect();
        pairs.sort();

        let mut key = format!("{} {url}", method.to_ascii_uppercase());
        for (name, value) in pairs {
            key.push(' ');
            key.push_str(&name);
            key.push('=');
            key.push_str(value);
        }
        Self(key)
    }

    /// Wrap an already-canonical key string
    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hex md5 of the key, stable across runs. Used as a file name by the
    /// disk provider.
    pub fn digest(&self) -> String {
        hex::encode(md5::compute(self.0.as_bytes()).0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
