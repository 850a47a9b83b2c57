//! In-memory remote store with the same matching rules as the real table.

use std::sync::RwLock;

use async_trait::async_trait;
use lectio_core::{RemoteError, RemoteRow, VerseRange};

use super::RemoteCommentaryStore;

/// Remote store backed by a `Vec` of rows.
///
/// Optionally enforces uniqueness on `(book, chapter, start, end, anchor)` to
/// model a migrated table with a unique constraint.
#[derive(Debug, Default)]
pub struct InMemoryRemoteStore {
    rows: RwLock<Vec<RemoteRow>>,
    enforce_unique: bool,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that rejects duplicate identity tuples.
    pub fn with_unique_constraint() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            enforce_unique: true,
        }
    }

    /// Seed rows directly, bypassing uniqueness checks.
    pub fn with_rows(rows: Vec<RemoteRow>) -> Self {
        Self {
            rows: RwLock::new(rows),
            enforce_unique: false,
        }
    }

    pub fn rows(&self) -> Vec<RemoteRow> {
        self.rows.read().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.rows.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn newest<F>(&self, matches: F) -> Result<Option<RemoteRow>, RemoteError>
    where
        F: Fn(&RemoteRow) -> bool,
    {
        let rows = self.rows.read().map_err(|_| RemoteError::Query {
            reason: "store lock poisoned".to_string(),
        })?;
        // Later inserts win ties on created_at
        Ok(rows
            .iter()
            .enumerate()
            .filter(|(_, row)| matches(row))
            .max_by_key(|(idx, row)| (row.created_at, *idx))
            .map(|(_, row)| row.clone()))
    }
}

#[async_trait]
impl RemoteCommentaryStore for InMemoryRemoteStore {
    async fn find_by_anchor_key(
        &self,
        book: &str,
        chapter: u32,
        range: VerseRange,
        anchor: u32,
    ) -> Result<Option<RemoteRow>, RemoteError> {
        self.newest(|row| {
            row.book == book
                && row.chapter == chapter
                && row.start_verse == range.start
                && row.end_verse == range.end
                && row.anchor_verse == Some(anchor)
        })
    }

    async fn find_by_range_key(
        &self,
        book: &str,
        chapter: u32,
        range: VerseRange,
    ) -> Result<Option<RemoteRow>, RemoteError> {
        self.newest(|row| {
            row.book == book
                && row.chapter == chapter
                && row.start_verse == range.start
                && row.end_verse == range.end
                && row.anchor_verse.is_none()
        })
    }

    async fn find_by_single_verse_key(
        &self,
        book: &str,
        chapter: u32,
        verse: u32,
    ) -> Result<Option<RemoteRow>, RemoteError> {
        self.find_by_range_key(book, chapter, VerseRange::new(verse, verse))
            .await
    }

    async fn find_by_anchor_verse(
        &self,
        book: &str,
        chapter: u32,
        anchor: u32,
    ) -> Result<Option<RemoteRow>, RemoteError> {
        self.newest(|row| {
            row.book == book && row.chapter == chapter && row.anchor_verse == Some(anchor)
        })
    }

    async fn insert(&self, row: &RemoteRow) -> Result<(), RemoteError> {
        let mut rows = self.rows.write().map_err(|_| RemoteError::Insert {
            reason: "store lock poisoned".to_string(),
        })?;
        if self.enforce_unique
            && rows.iter().any(|r| {
                r.book == row.book
                    && r.chapter == row.chapter
                    && r.start_verse == row.start_verse
                    && r.end_verse == row.end_verse
                    && r.anchor_verse == row.anchor_verse
            })
        {
            return Err(RemoteError::Duplicate {
                reason: format!(
                    "{} {}:{}-{} already stored",
                    row.book, row.chapter, row.start_verse, row.end_verse
                ),
            });
        }
        rows.push(row.clone());
        Ok(())
    }
}
