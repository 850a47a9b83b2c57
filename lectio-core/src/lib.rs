//! Lectio Core - Passage Model and Cache Keys
//!
//! Pure data structures and pure functions shared by every other crate:
//! passage anchors, commentary records, canon tables, cache-key derivation,
//! configuration and the error taxonomy. No I/O lives here.

pub mod canon;
pub mod config;
pub mod error;
pub mod keys;
pub mod passage;

pub use canon::{books, find_book, Book};
pub use config::{GeneratorConfig, LectioConfig, LocalCacheConfig, RemoteStoreConfig};
pub use error::{
    AnchorError, CacheError, ConfigError, GenerationError, LectioError, LectioResult, RemoteError,
};
pub use keys::{derive_keys, CacheKey, DerivedKeys, KeyShape};
pub use passage::{
    CommentaryRecord, PassageAnchor, PassageIdentity, RandomVerse, RemoteRow, SourceTier,
    VerseRange,
};
