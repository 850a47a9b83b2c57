//! Local (on-device) cache tier.
//!
//! The cheapest tier: a private key→text store that is probed before any
//! network call. Two backends are provided:
//!
//! - [`LmdbLocalCache`]: persistent, memory-mapped store via heed
//! - [`InMemoryLocalCache`]: process-local map for tests and ephemeral use
//!
//! Values are encoded as [`CachedEntry`] documents so a record keeps its
//! resolved verse range and a corrected range can be reached through an alias.
//!
//! # Example
//!
//! ```ignore
//! let cache = LmdbLocalCache::from_config(&config.local)?;
//! if let Some(raw) = cache.get(&key.to_string()).await? {
//!     // decode with CachedEntry::decode(&raw, &key)
//! }
//! ```

pub mod entry;
pub mod lmdb_backend;
pub mod memory;
pub mod traits;

pub use entry::{CachedCommentary, CachedEntry};
pub use lmdb_backend::LmdbLocalCache;
pub use memory::InMemoryLocalCache;
pub use traits::{CacheStats, LocalCacheStore};
