//! Content hashing with BLAKE3.
//!
//! Cache entries are addressed by the digest of the uploaded image bytes, so
//! two identical photos share one unit of remote cost.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Hex-encoded BLAKE3 digest of an image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Returns the digest as a hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a short prefix for log lines.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes content digests for image payloads.
///
/// # Examples
///
/// ```rust
/// use nutriscan::core::ContentHasher;
///
/// let hasher = ContentHasher::new();
/// let a = hasher.digest(b"label bytes");
/// let b = hasher.digest(b"label bytes");
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ContentHasher {
    key: Option<[u8; 32]>,
}

impl ContentHasher {
    /// Creates a hasher using plain BLAKE3.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses keyed BLAKE3, so digests differ between deployments sharing a cache.
    pub fn with_key(mut self, key: [u8; 32]) -> Self {
        self.key = Some(key);
        self
    }

    /// Computes the digest of the given bytes.
    pub fn digest(&self, data: &[u8]) -> ContentDigest {
        let hash = match &self.key {
            Some(key) => blake3::keyed_hash(key, data),
            None => blake3::hash(data),
        };
        ContentDigest(hash.to_hex().to_string())
    }
}
