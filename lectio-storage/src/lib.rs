//! Lectio Storage - Local Cache and Remote Store
//!
//! The two cached tiers in front of the generative service:
//!
//! - [`cache`]: the private on-device cache (LMDB or in-memory)
//! - [`remote`]: the shared remote datastore (PostgREST or in-memory)
//!
//! Both are exposed as async traits so the resolver can be wired against
//! real backends in production and in-memory ones in tests.

pub mod cache;
pub mod remote;

pub use cache::{
    CacheStats, CachedCommentary, CachedEntry, InMemoryLocalCache, LmdbLocalCache, LocalCacheStore,
};
pub use remote::{InMemoryRemoteStore, PostgrestCommentaryStore, RemoteCommentaryStore};
