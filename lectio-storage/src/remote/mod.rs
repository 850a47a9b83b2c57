//! Shared remote commentary store.
//!
//! The middle tier: a datastore shared by every client, queried with exact
//! equality filters. Range-only and single-verse lookups only match rows whose
//! `anchor_verse` is null; a row with any anchor verse never satisfies them.
//!
//! Rows are append-only from the client's point of view. No uniqueness
//! constraint on `(book, chapter, start_verse, end_verse, anchor_verse)` is
//! assumed, so lookups return the newest matching row.

pub mod memory;
pub mod postgrest;

pub use memory::InMemoryRemoteStore;
pub use postgrest::PostgrestCommentaryStore;

use async_trait::async_trait;
use lectio_core::{CacheKey, RemoteError, RemoteRow, VerseRange};

/// Remote store trait for pluggable implementations.
#[async_trait]
pub trait RemoteCommentaryStore: Send + Sync {
    /// Newest row matching book, chapter, range and a specific anchor verse.
    async fn find_by_anchor_key(
        &self,
        book: &str,
        chapter: u32,
        range: VerseRange,
        anchor: u32,
    ) -> Result<Option<RemoteRow>, RemoteError>;

    /// Newest row matching book, chapter and range with a null anchor verse.
    async fn find_by_range_key(
        &self,
        book: &str,
        chapter: u32,
        range: VerseRange,
    ) -> Result<Option<RemoteRow>, RemoteError>;

    /// Newest row covering exactly one verse with a null anchor verse.
    async fn find_by_single_verse_key(
        &self,
        book: &str,
        chapter: u32,
        verse: u32,
    ) -> Result<Option<RemoteRow>, RemoteError>;

    /// Newest row for an anchor verse, whatever range the generator chose.
    async fn find_by_anchor_verse(
        &self,
        book: &str,
        chapter: u32,
        anchor: u32,
    ) -> Result<Option<RemoteRow>, RemoteError>;

    /// Append a row. Fails with [`RemoteError::Duplicate`] when the store
    /// enforces uniqueness and an equivalent row exists.
    async fn insert(&self, row: &RemoteRow) -> Result<(), RemoteError>;

    /// Dispatch a lookup by key shape.
    async fn find(&self, key: &CacheKey) -> Result<Option<RemoteRow>, RemoteError> {
        match key {
            CacheKey::Anchored {
                book,
                chapter,
                range,
                anchor,
            } => self.find_by_anchor_key(book, *chapter, *range, *anchor).await,
            CacheKey::Range {
                book,
                chapter,
                range,
            } => self.find_by_range_key(book, *chapter, *range).await,
            CacheKey::SingleVerse {
                book,
                chapter,
                verse,
            } => self.find_by_single_verse_key(book, *chapter, *verse).await,
        }
    }
}
