//! Hashing utilities for cache keys.

use sha2::{Digest, Sha256};

/// Compute SHA256 hash of a byte slice.
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

pub fn sha256_str(s: &str) -> String {
    sha256_bytes(s.as_bytes())
}

/// Builds a cache key from several components.
#[derive(Default)]
pub struct CacheKey {
    hasher: Sha256,
}

impl CacheKey {
    pub fn new() -> Self {
        CacheKey {
            hasher: Sha256::new(),
        }
    }

    /// Add a string component to the key.
    pub fn part(&mut self, s: &str) -> &mut Self {
        self.hasher.update(s.as_bytes());
        self.hasher.update(b"\0");
        self
    }

    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}
