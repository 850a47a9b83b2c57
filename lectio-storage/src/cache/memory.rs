//! In-memory local cache, for tests and ephemeral sessions.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use lectio_core::CacheError;

use super::traits::{CacheStats, LocalCacheStore};

/// Local cache held in a `HashMap`. Contents are lost when dropped.
#[derive(Debug, Default)]
pub struct InMemoryLocalCache {
    entries: RwLock<HashMap<String, String>>,
    stats: RwLock<CacheStats>,
}

impl InMemoryLocalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .map(|e| e.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .read()
            .map(|e| e.contains_key(key))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_error(key: &str) -> CacheError {
        CacheError::Read {
            key: key.to_string(),
            reason: "cache lock poisoned".to_string(),
        }
    }
}

#[async_trait]
impl LocalCacheStore for InMemoryLocalCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let value = self
            .entries
            .read()
            .map_err(|_| Self::lock_error(key))?
            .get(key)
            .cloned();
        if let Ok(mut stats) = self.stats.write() {
            if value.is_some() {
                stats.hits += 1;
            } else {
                stats.misses += 1;
            }
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.entries
            .write()
            .map_err(|_| CacheError::Write {
                key: key.to_string(),
                reason: "cache lock poisoned".to_string(),
            })?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.entries
            .write()
            .map_err(|_| CacheError::Write {
                key: key.to_string(),
                reason: "cache lock poisoned".to_string(),
            })?
            .remove(key);
        Ok(())
    }

    async fn stats(&self) -> CacheStats {
        let mut stats = self.stats.read().map(|s| s.clone()).unwrap_or_default();
        stats.entry_count = self.len() as u64;
        stats
    }
}
