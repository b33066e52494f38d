//! Response cache for resolver calls.
//!
//! Two tiers, checked in order: an in-memory TTL cache, then one JSON file
//! per key on disk where the file's mtime is the TTL clock. Entries are keyed
//! by operation name plus a canonicalized (order-independent) argument set,
//! so the same call always lands on the same file regardless of how the
//! arguments were assembled.
//!
//! The cache is best-effort: persistence failures are logged and swallowed,
//! never surfaced to the caller. Concurrent writers race harmlessly — writes
//! for identical inputs are idempotent and last-write-wins.

use std::path::{Path, PathBuf};
use std::time::Duration;

use mini_moka::sync::Cache;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::Result;

/// Maximum entries held in the memory tier.
const MEMORY_CAPACITY: u64 = 256;

/// Two-tier (memory, then disk) response cache.
pub struct ResponseCache {
    memory: Cache<String, serde_json::Value>,
    cache_dir: PathBuf,
    ttl: Duration,
}

impl ResponseCache {
    /// Create a cache rooted at `cache_dir` with the given TTL.
    ///
    /// The directory is created lazily on first write, so construction never
    /// fails.
    pub fn new(cache_dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        let mut builder = Cache::builder().max_capacity(MEMORY_CAPACITY);
        if !ttl.is_zero() {
            builder = builder.time_to_live(ttl);
        }
        Self {
            memory: builder.build(),
            cache_dir: cache_dir.into(),
            ttl,
        }
    }

    /// Stable cache key for an operation and its arguments.
    ///
    /// Arguments are sorted by name before hashing, making the key
    /// independent of call-site ordering.
    pub fn key(operation: &str, args: &[(&str, &str)]) -> String {
        let mut sorted: Vec<(&str, &str)> = args.to_vec();
        sorted.sort();

        let mut hasher = Sha256::new();
        hasher.update(operation.as_bytes());
        for (name, value) in &sorted {
            hasher.update([0u8]);
            hasher.update(name.as_bytes());
            hasher.update([b'=']);
            hasher.update(value.as_bytes());
        }
        let digest = hex::encode(hasher.finalize());
        format!("{}-{}", operation, &digest[..16])
    }

    /// Look up a fresh entry, falling back to `fetch` on a miss.
    ///
    /// A memory hit returns without touching disk; a fresh disk hit
    /// repopulates memory. On a live fetch, the result is persisted to both
    /// tiers (best-effort) before being returned verbatim.
    pub async fn get_or_fetch<T, F, Fut>(
        &self,
        operation: &str,
        args: &[(&str, &str)],
        fetch: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let key = Self::key(operation, args);

        // A zero TTL means everything is already stale; skip both tiers.
        if self.ttl.is_zero() {
            let result = fetch().await?;
            self.store(&key, &result);
            return Ok(result);
        }

        if let Some(value) = self.memory.get(&key) {
            if let Ok(result) = serde_json::from_value::<T>(value) {
                debug!("Cache hit (memory) for {}", key);
                return Ok(result);
            }
        }

        if let Some(value) = self.read_disk(&key) {
            if let Ok(result) = serde_json::from_value::<T>(value.clone()) {
                debug!("Cache hit (disk) for {}", key);
                self.memory.insert(key, value);
                return Ok(result);
            }
        }

        let result = fetch().await?;
        self.store(&key, &result);
        Ok(result)
    }

    fn store<T: Serialize>(&self, key: &str, result: &T) {
        let value = match serde_json::to_value(result) {
            Ok(value) => value,
            Err(e) => {
                warn!("Skipping cache for {}: unserializable result: {}", key, e);
                return;
            }
        };

        if let Err(e) = self.write_disk(key, &value) {
            warn!("Failed to persist cache entry {}: {}", key, e);
        }
        self.memory.insert(key.to_string(), value);
    }

    /// Read a disk entry if it exists and is younger than the TTL.
    fn read_disk(&self, key: &str) -> Option<serde_json::Value> {
        let path = self.entry_path(key);
        if !self.is_fresh(&path) {
            return None;
        }

        match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("Failed to parse cache file {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                warn!("Failed to read cache file {}: {}", path.display(), e);
                None
            }
        }
    }

    fn write_disk(&self, key: &str, value: &serde_json::Value) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.cache_dir)?;
        let contents = serde_json::to_string(value)?;
        std::fs::write(self.entry_path(key), contents)
    }

    /// Whether a cache file exists and its mtime is within the TTL.
    fn is_fresh(&self, path: &Path) -> bool {
        let Ok(metadata) = std::fs::metadata(path) else {
            return false;
        };
        let Ok(modified) = metadata.modified() else {
            return false;
        };
        match modified.elapsed() {
            Ok(age) => age < self.ttl,
            // An mtime in the future means the clock moved; treat as fresh.
            Err(_) => true,
        }
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{key}.json"))
    }
}
