//! LMDB-backed local cache.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a memory-mapped,
//! crash-safe key-value store on the device. Keys and values are UTF-8
//! strings; the value encoding is owned by [`super::entry`].
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The backend uses:
//! - Read transactions for `get`
//! - Write transactions for `set` and `remove`
//! - Statistics are tracked behind a lock and never fail an operation

use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use heed::types::Str;
use heed::{Database, Env, EnvOpenOptions};
use lectio_core::{CacheError, LocalCacheConfig};

use super::traits::{CacheStats, LocalCacheStore};

/// LMDB-backed local cache.
///
/// # Example
///
/// ```ignore
/// use lectio_storage::cache::{LmdbLocalCache, LocalCacheStore};
///
/// let cache = LmdbLocalCache::new("/tmp/lectio-cache", 16)?;
/// cache.set("commentary:John:3:16-16", "...").await?;
/// let cached = cache.get("commentary:John:3:16-16").await?;
/// ```
pub struct LmdbLocalCache {
    /// The LMDB environment.
    env: Env,
    /// The main database (single unnamed database).
    db: Database<Str, Str>,
    /// Usage statistics.
    stats: RwLock<CacheStats>,
}

impl LmdbLocalCache {
    /// Open (or create) an LMDB cache.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the LMDB
    /// environment or database cannot be opened.
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, CacheError> {
        std::fs::create_dir_all(&path).map_err(|e| open_error(e.to_string()))?;

        // SAFETY: the environment is opened once per path by this process and
        // the memory map is not modified outside of LMDB transactions.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb.max(1) * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| open_error(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(|e| open_error(e.to_string()))?;
        let db: Database<Str, Str> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| open_error(e.to_string()))?;
        let entry_count = db.len(&wtxn).map_err(|e| open_error(e.to_string()))?;
        wtxn.commit().map_err(|e| open_error(e.to_string()))?;

        tracing::debug!(path = %path.as_ref().display(), entries = entry_count, "opened local cache");

        Ok(Self {
            env,
            db,
            stats: RwLock::new(CacheStats {
                entry_count,
                ..Default::default()
            }),
        })
    }

    /// Open the cache described by configuration.
    pub fn from_config(config: &LocalCacheConfig) -> Result<Self, CacheError> {
        Self::new(&config.path, config.max_size_mb)
    }

    fn record<F: FnOnce(&mut CacheStats)>(&self, update: F) {
        if let Ok(mut stats) = self.stats.write() {
            update(&mut stats);
        }
    }
}

fn open_error(reason: String) -> CacheError {
    CacheError::Open { reason }
}

#[async_trait]
impl LocalCacheStore for LmdbLocalCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let read_error = |reason: String| CacheError::Read {
            key: key.to_string(),
            reason,
        };

        let rtxn = self.env.read_txn().map_err(|e| read_error(e.to_string()))?;
        match self.db.get(&rtxn, key) {
            Ok(Some(value)) => {
                self.record(|s| s.hits += 1);
                Ok(Some(value.to_string()))
            }
            Ok(None) => {
                self.record(|s| s.misses += 1);
                Ok(None)
            }
            Err(e) => {
                self.record(|s| s.errors += 1);
                Err(read_error(e.to_string()))
            }
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let write_error = |reason: String| CacheError::Write {
            key: key.to_string(),
            reason,
        };

        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| write_error(e.to_string()))?;
        let is_new = self
            .db
            .get(&wtxn, key)
            .map_err(|e| write_error(e.to_string()))?
            .is_none();
        self.db
            .put(&mut wtxn, key, value)
            .map_err(|e| write_error(e.to_string()))?;
        wtxn.commit().map_err(|e| write_error(e.to_string()))?;

        if is_new {
            self.record(|s| s.entry_count += 1);
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        let write_error = |reason: String| CacheError::Write {
            key: key.to_string(),
            reason,
        };

        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| write_error(e.to_string()))?;
        let deleted = self
            .db
            .delete(&mut wtxn, key)
            .map_err(|e| write_error(e.to_string()))?;
        wtxn.commit().map_err(|e| write_error(e.to_string()))?;

        if deleted {
            self.record(|s| s.entry_count = s.entry_count.saturating_sub(1));
        }
        Ok(())
    }

    async fn stats(&self) -> CacheStats {
        self.stats.read().map(|s| s.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_cache() -> (LmdbLocalCache, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let cache = LmdbLocalCache::new(temp_dir.path(), 10).expect("cache creation should succeed");
        (cache, temp_dir)
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let (cache, _temp_dir) = create_test_cache();

        cache
            .set("commentary:John:3:16-16", "For God so loved")
            .await
            .expect("set should succeed");

        let cached = cache
            .get("commentary:John:3:16-16")
            .await
            .expect("get should succeed");
        assert_eq!(cached.as_deref(), Some("For God so loved"));
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let (cache, _temp_dir) = create_test_cache();
        let cached = cache
            .get("commentary:Jude:1:1-1")
            .await
            .expect("get should succeed");
        assert!(cached.is_none());
    }

    #[tokio::test]
    async fn test_remove() {
        let (cache, _temp_dir) = create_test_cache();

        cache.set("k", "v").await.expect("set should succeed");
        cache.remove("k").await.expect("remove should succeed");
        assert!(cache.get("k").await.expect("get should succeed").is_none());

        // Removing again is not an error
        cache.remove("k").await.expect("second remove should succeed");
    }

    #[tokio::test]
    async fn test_overwrite() {
        let (cache, _temp_dir) = create_test_cache();

        cache.set("k", "first").await.expect("set should succeed");
        cache.set("k", "second").await.expect("set should succeed");

        assert_eq!(
            cache.get("k").await.expect("get should succeed").as_deref(),
            Some("second")
        );
        assert_eq!(cache.stats().await.entry_count, 1);
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        {
            let cache = LmdbLocalCache::new(temp_dir.path(), 10).expect("open");
            cache.set("k", "persisted").await.expect("set should succeed");
        }
        let cache = LmdbLocalCache::new(temp_dir.path(), 10).expect("reopen");
        assert_eq!(cache.stats().await.entry_count, 1);
        assert_eq!(
            cache.get("k").await.expect("get should succeed").as_deref(),
            Some("persisted")
        );
    }

    #[tokio::test]
    async fn test_stats() {
        let (cache, _temp_dir) = create_test_cache();

        let _ = cache.get("k").await;
        cache.set("k", "v").await.expect("set should succeed");
        let _ = cache.get("k").await;
        let _ = cache.get("k").await;

        let stats = cache.stats().await;
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.entry_count, 1);
    }
}
