//! Passage and commentary data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::canon;
use crate::error::AnchorError;

/// A requested passage: a verse range within one chapter, optionally centered
/// on an anchor verse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassageAnchor {
    pub book: String,
    pub chapter: u32,
    pub start_verse: u32,
    pub end_verse: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_verse: Option<u32>,
    /// The range was not chosen by the caller; the generative service may pick
    /// its own range around `anchor_verse`.
    #[serde(default)]
    pub open_range: bool,
}

impl PassageAnchor {
    /// An explicit verse range with no anchor verse.
    pub fn range(book: impl Into<String>, chapter: u32, start_verse: u32, end_verse: u32) -> Self {
        Self {
            book: book.into(),
            chapter,
            start_verse,
            end_verse,
            anchor_verse: None,
            open_range: false,
        }
    }

    /// A single verse.
    pub fn verse(book: impl Into<String>, chapter: u32, verse: u32) -> Self {
        Self::range(book, chapter, verse, verse)
    }

    /// Only an anchor verse is known; the surrounding range is left to the
    /// generative service.
    pub fn anchor_only(book: impl Into<String>, chapter: u32, anchor_verse: u32) -> Self {
        Self {
            book: book.into(),
            chapter,
            start_verse: anchor_verse,
            end_verse: anchor_verse,
            anchor_verse: Some(anchor_verse),
            open_range: true,
        }
    }

    /// Attach an anchor verse to an explicit range.
    pub fn with_anchor(mut self, anchor_verse: u32) -> Self {
        self.anchor_verse = Some(anchor_verse);
        self
    }

    pub fn requested_range(&self) -> VerseRange {
        VerseRange::new(self.start_verse, self.end_verse)
    }

    pub fn identity(&self) -> PassageIdentity {
        PassageIdentity {
            book: self.book.clone(),
            chapter: self.chapter,
            start_verse: self.start_verse,
            end_verse: self.end_verse,
            anchor_verse: self.anchor_verse,
            open_range: self.open_range,
        }
    }

    /// Check structural validity against the canon tables.
    ///
    /// Returns the canonical book name on success so keys and remote rows
    /// never depend on caller casing.
    pub fn validate(&self) -> Result<&'static str, AnchorError> {
        if self.book.trim().is_empty() {
            return Err(AnchorError::EmptyBook);
        }
        for (field, value) in [
            ("chapter", self.chapter),
            ("start verse", self.start_verse),
            ("end verse", self.end_verse),
        ] {
            if value == 0 {
                return Err(AnchorError::NotPositive { field, value });
            }
        }
        if let Some(0) = self.anchor_verse {
            return Err(AnchorError::NotPositive {
                field: "anchor verse",
                value: 0,
            });
        }
        if self.start_verse > self.end_verse {
            return Err(AnchorError::InvertedRange {
                start: self.start_verse,
                end: self.end_verse,
            });
        }

        let book = canon::find_book(&self.book).ok_or_else(|| AnchorError::UnknownBook {
            book: self.book.clone(),
        })?;
        if self.chapter > book.chapters() {
            return Err(AnchorError::ChapterOutOfRange {
                book: book.name().to_string(),
                chapter: self.chapter,
                chapters: book.chapters(),
            });
        }
        Ok(book.name())
    }
}

impl fmt::Display for PassageAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}:{}", self.book, self.chapter, self.start_verse)?;
        if self.end_verse != self.start_verse {
            write!(f, "-{}", self.end_verse)?;
        }
        if let Some(anchor) = self.anchor_verse {
            write!(f, " (anchor {})", anchor)?;
        }
        Ok(())
    }
}

/// What makes two requests "the same passage" for cancellation purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PassageIdentity {
    pub book: String,
    pub chapter: u32,
    pub start_verse: u32,
    pub end_verse: u32,
    pub anchor_verse: Option<u32>,
    /// Anchor-only and explicit requests differ even with equal verses
    pub open_range: bool,
}

/// Inclusive verse range within one chapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VerseRange {
    pub start: u32,
    pub end: u32,
}

impl VerseRange {
    /// Build a range, swapping the bounds if they arrive out of order.
    pub fn new(start: u32, end: u32) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    pub fn contains(&self, verse: u32) -> bool {
        (self.start..=self.end).contains(&verse)
    }

    pub fn len(&self) -> u32 {
        self.end - self.start + 1
    }

    pub fn is_single(&self) -> bool {
        self.start == self.end
    }

    /// Verse numbers in the range, for re-rendering verse lists.
    pub fn verses(&self) -> impl Iterator<Item = u32> {
        self.start..=self.end
    }
}

/// Which tier answered a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceTier {
    /// Private on-device cache
    Local,
    /// Shared remote datastore
    Remote,
    /// Freshly generated
    Generated,
}

/// A verse picked by the generative service to accompany the commentary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomVerse {
    pub verse: u32,
    pub text: String,
}

/// Resolved commentary for a passage.
///
/// `resolved_range` may differ from the requested range; callers must render
/// verse lists from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentaryRecord {
    pub text: String,
    pub source_tier: SourceTier,
    pub resolved_range: VerseRange,
    pub anchor_verse: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub random_verse: Option<RandomVerse>,
}

impl CommentaryRecord {
    pub fn new(text: impl Into<String>, source_tier: SourceTier, resolved_range: VerseRange) -> Self {
        Self {
            text: text.into(),
            source_tier,
            resolved_range,
            anchor_verse: None,
            random_verse: None,
        }
    }

    pub fn with_anchor_verse(mut self, anchor_verse: Option<u32>) -> Self {
        self.anchor_verse = anchor_verse;
        self
    }

    pub fn with_random_verse(mut self, random_verse: Option<RandomVerse>) -> Self {
        self.random_verse = random_verse;
        self
    }

    /// Same content, reported as coming from another tier.
    pub fn from_tier(mut self, source_tier: SourceTier) -> Self {
        self.source_tier = source_tier;
        self
    }
}

/// Persisted row shape in the shared remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRow {
    pub book: String,
    pub chapter: u32,
    pub start_verse: u32,
    pub end_verse: u32,
    pub anchor_verse: Option<u32>,
    pub commentary: String,
    pub created_at: DateTime<Utc>,
}

impl RemoteRow {
    pub fn range(&self) -> VerseRange {
        VerseRange::new(self.start_verse, self.end_verse)
    }

    pub fn into_record(self) -> CommentaryRecord {
        let range = self.range();
        CommentaryRecord::new(self.commentary, SourceTier::Remote, range)
            .with_anchor_verse(self.anchor_verse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_known_passage() {
        let anchor = PassageAnchor::range("genesis", 1, 1, 3);
        assert_eq!(anchor.validate(), Ok("Genesis"));
    }

    #[test]
    fn test_validate_rejects_bad_input() {
        assert_eq!(
            PassageAnchor::range("", 1, 1, 1).validate(),
            Err(AnchorError::EmptyBook)
        );
        assert_eq!(
            PassageAnchor::range("   ", 1, 1, 1).validate(),
            Err(AnchorError::EmptyBook)
        );
        assert!(matches!(
            PassageAnchor::range("John", 0, 1, 1).validate(),
            Err(AnchorError::NotPositive { field: "chapter", .. })
        ));
        assert_eq!(
            PassageAnchor::range("John", 3, 17, 16).validate(),
            Err(AnchorError::InvertedRange { start: 17, end: 16 })
        );
        assert!(matches!(
            PassageAnchor::range("Hezekiah", 1, 1, 1).validate(),
            Err(AnchorError::UnknownBook { .. })
        ));
        assert!(matches!(
            PassageAnchor::range("Jude", 2, 1, 1).validate(),
            Err(AnchorError::ChapterOutOfRange { chapters: 1, .. })
        ));
        assert!(matches!(
            PassageAnchor::range("Jude", 1, 1, 4).with_anchor(0).validate(),
            Err(AnchorError::NotPositive { field: "anchor verse", .. })
        ));
    }

    #[test]
    fn test_anchor_only_is_open_single_verse() {
        let anchor = PassageAnchor::anchor_only("Psalms", 23, 4);
        assert!(anchor.open_range);
        assert_eq!(anchor.requested_range(), VerseRange::new(4, 4));
        assert_eq!(anchor.anchor_verse, Some(4));
    }

    #[test]
    fn test_identity_distinguishes_open_range() {
        let open = PassageAnchor::anchor_only("Psalms", 23, 4);
        let explicit = PassageAnchor::range("Psalms", 23, 4, 4).with_anchor(4);
        assert_ne!(open.identity(), explicit.identity());
        assert_eq!(open.identity(), open.clone().identity());
    }

    #[test]
    fn test_verse_range_normalizes_order() {
        let range = VerseRange::new(7, 5);
        assert_eq!(range, VerseRange { start: 5, end: 7 });
        assert_eq!(range.len(), 3);
        assert!(range.contains(6));
        assert!(!range.contains(8));
        assert_eq!(range.verses().collect::<Vec<_>>(), vec![5, 6, 7]);
    }

    #[test]
    fn test_anchor_serde_uses_camel_case() {
        let json = serde_json::to_value(PassageAnchor::range("Mark", 4, 35, 41).with_anchor(39))
            .expect("serialize");
        assert_eq!(json["startVerse"], 35);
        assert_eq!(json["anchorVerse"], 39);

        let parsed: PassageAnchor = serde_json::from_str(
            r#"{"book":"Mark","chapter":4,"startVerse":35,"endVerse":41}"#,
        )
        .expect("deserialize");
        assert_eq!(parsed.anchor_verse, None);
        assert!(!parsed.open_range);
    }

    #[test]
    fn test_display() {
        assert_eq!(PassageAnchor::verse("John", 3, 16).to_string(), "John 3:16");
        assert_eq!(
            PassageAnchor::range("John", 3, 16, 18).with_anchor(17).to_string(),
            "John 3:16-18 (anchor 17)"
        );
    }
}
