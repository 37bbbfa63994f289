//! Disposable binary caches.
//!
//! Some derived data (module lists for shell completion, parsed databases)
//! is expensive to rebuild on every invocation. [`BinaryCache`] keeps such
//! data in a directory as postcard-encoded files. Entries are never
//! authoritative: anything older than the configured age, or anything that
//! fails to decode, is deleted and reported as a miss so the caller
//! recomputes it from the JSON databases. Caches are not locked.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::util::errors::{DbError, DbResult};
use crate::util::fs as dfs;
use crate::util::hash::sha256_str;

#[derive(Serialize, Deserialize)]
struct Envelope {
    created_unix: u64,
    payload: Vec<u8>,
}

/// A directory of cached blobs with an age limit.
#[derive(Debug, Clone)]
pub struct BinaryCache {
    dir: PathBuf,
    max_age: Duration,
}

impl BinaryCache {
    pub fn new(dir: impl Into<PathBuf>, max_age: Duration) -> Self {
        BinaryCache {
            dir: dir.into(),
            max_age,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.bin", sha256_str(key)))
    }

    /// Store raw bytes under `key`.
    pub fn store_bytes(&self, key: &str, bytes: &[u8]) -> DbResult<()> {
        dfs::ensure_dir(&self.dir)?;
        let envelope = Envelope {
            created_unix: now_unix(),
            payload: bytes.to_vec(),
        };
        let encoded = postcard::to_allocvec(&envelope).map_err(|e| DbError::Invalid {
            kind: "cache entry",
            message: e.to_string(),
            origin: key.to_string(),
        })?;
        dfs::write_atomic(&self.entry_path(key), &encoded, None)
    }

    /// Fetch the bytes stored under `key` if present and fresh.
    pub fn fetch_bytes(&self, key: &str) -> Option<Vec<u8>> {
        let path = self.entry_path(key);
        let raw = fs::read(&path).ok()?;
        let envelope: Envelope = match postcard::from_bytes(&raw) {
            Ok(env) => env,
            Err(e) => {
                tracing::debug!("dropping undecodable cache entry {}: {}", path.display(), e);
                self.remove(key);
                return None;
            }
        };
        let age = now_unix().saturating_sub(envelope.created_unix);
        if age > self.max_age.as_secs() {
            tracing::debug!("cache entry for {:?} is stale ({}s old)", key, age);
            self.remove(key);
            return None;
        }
        Some(envelope.payload)
    }

    /// Encode `value` with postcard and store it.
    pub fn store<T: Serialize>(&self, key: &str, value: &T) -> DbResult<()> {
        let bytes = postcard::to_allocvec(value).map_err(|e| DbError::Invalid {
            kind: "cache entry",
            message: e.to_string(),
            origin: key.to_string(),
        })?;
        self.store_bytes(key, &bytes)
    }

    /// Fetch and decode a value; any failure is a miss.
    pub fn fetch<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = self.fetch_bytes(key)?;
        match postcard::from_bytes(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!("dropping cache entry for {:?}: {}", key, e);
                self.remove(key);
                None
            }
        }
    }

    /// Forget the entry for `key`.
    pub fn remove(&self, key: &str) {
        let _ = fs::remove_file(self.entry_path(key));
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
