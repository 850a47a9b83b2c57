//! Cache key derivation.
//!
//! A passage maps to one to three lookup keys, most specific first:
//! anchor-qualified, range-only, then single-verse (only when the range is a
//! single verse). Every tier is probed in this order.
//!
//! String format: `commentary:{book}:{chapter}:{start}-{end}[:{anchor}]`, with
//! the single-verse shape rendered as `commentary:{book}:{chapter}:{verse}`.

use std::fmt;
use std::str::FromStr;

use crate::error::{AnchorError, CacheError};
use crate::passage::{PassageAnchor, VerseRange};

const KEY_PREFIX: &str = "commentary";

/// Shape of a cache key, ordered from most to least specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyShape {
    Anchored,
    Range,
    SingleVerse,
}

/// A lookup key for one tier probe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Anchored {
        book: String,
        chapter: u32,
        range: VerseRange,
        anchor: u32,
    },
    Range {
        book: String,
        chapter: u32,
        range: VerseRange,
    },
    SingleVerse {
        book: String,
        chapter: u32,
        verse: u32,
    },
}

impl CacheKey {
    /// Most specific key for a range, with the anchor verse when there is one.
    pub fn most_specific(
        book: impl Into<String>,
        chapter: u32,
        range: VerseRange,
        anchor: Option<u32>,
    ) -> Self {
        let book = book.into();
        match anchor {
            Some(anchor) => CacheKey::Anchored {
                book,
                chapter,
                range,
                anchor,
            },
            None => CacheKey::Range {
                book,
                chapter,
                range,
            },
        }
    }

    pub fn shape(&self) -> KeyShape {
        match self {
            CacheKey::Anchored { .. } => KeyShape::Anchored,
            CacheKey::Range { .. } => KeyShape::Range,
            CacheKey::SingleVerse { .. } => KeyShape::SingleVerse,
        }
    }

    pub fn book(&self) -> &str {
        match self {
            CacheKey::Anchored { book, .. }
            | CacheKey::Range { book, .. }
            | CacheKey::SingleVerse { book, .. } => book,
        }
    }

    pub fn chapter(&self) -> u32 {
        match self {
            CacheKey::Anchored { chapter, .. }
            | CacheKey::Range { chapter, .. }
            | CacheKey::SingleVerse { chapter, .. } => *chapter,
        }
    }

    /// The verse range this key covers.
    pub fn range(&self) -> VerseRange {
        match self {
            CacheKey::Anchored { range, .. } | CacheKey::Range { range, .. } => *range,
            CacheKey::SingleVerse { verse, .. } => VerseRange::new(*verse, *verse),
        }
    }

    pub fn anchor(&self) -> Option<u32> {
        match self {
            CacheKey::Anchored { anchor, .. } => Some(*anchor),
            _ => None,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Anchored {
                book,
                chapter,
                range,
                anchor,
            } => write!(
                f,
                "{KEY_PREFIX}:{book}:{chapter}:{}-{}:{anchor}",
                range.start, range.end
            ),
            CacheKey::Range {
                book,
                chapter,
                range,
            } => write!(f, "{KEY_PREFIX}:{book}:{chapter}:{}-{}", range.start, range.end),
            CacheKey::SingleVerse {
                book,
                chapter,
                verse,
            } => write!(f, "{KEY_PREFIX}:{book}:{chapter}:{verse}"),
        }
    }
}

impl FromStr for CacheKey {
    type Err = CacheError;

    /// Parse the string form back into a key. Book names never contain `:`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || CacheError::MalformedKey { key: s.to_string() };
        let number = |part: &str| part.parse::<u32>().map_err(|_| malformed());

        let parts: Vec<&str> = s.split(':').collect();
        let (book, chapter, verses, anchor) = match parts.as_slice() {
            [KEY_PREFIX, book, chapter, verses] => (*book, *chapter, *verses, None),
            [KEY_PREFIX, book, chapter, verses, anchor] => (*book, *chapter, *verses, Some(*anchor)),
            _ => return Err(malformed()),
        };
        if book.is_empty() {
            return Err(malformed());
        }
        let book = book.to_string();
        let chapter = number(chapter)?;

        match (verses.split_once('-'), anchor) {
            (Some((start, end)), anchor) => {
                let range = VerseRange::new(number(start)?, number(end)?);
                let anchor = anchor.map(number).transpose()?;
                Ok(CacheKey::most_specific(book, chapter, range, anchor))
            }
            (None, None) => Ok(CacheKey::SingleVerse {
                book,
                chapter,
                verse: number(verses)?,
            }),
            (None, Some(_)) => Err(malformed()),
        }
    }
}

/// Keys derived for one passage, most specific first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedKeys {
    keys: Vec<CacheKey>,
}

impl DerivedKeys {
    pub fn iter(&self) -> impl Iterator<Item = &CacheKey> {
        self.keys.iter()
    }

    /// The key every write-back and single-flight entry is addressed by.
    pub fn most_specific(&self) -> &CacheKey {
        // derive_keys always yields at least the range key
        &self.keys[0]
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn into_vec(self) -> Vec<CacheKey> {
        self.keys
    }
}

impl<'a> IntoIterator for &'a DerivedKeys {
    type Item = &'a CacheKey;
    type IntoIter = std::slice::Iter<'a, CacheKey>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.iter()
    }
}

/// Derive the ordered lookup keys for a passage.
///
/// Validation runs first; no key is produced for a malformed anchor.
pub fn derive_keys(anchor: &PassageAnchor) -> Result<DerivedKeys, AnchorError> {
    let book = anchor.validate()?;
    let range = anchor.requested_range();
    let mut keys = Vec::with_capacity(3);

    if let Some(anchor_verse) = anchor.anchor_verse {
        keys.push(CacheKey::Anchored {
            book: book.to_string(),
            chapter: anchor.chapter,
            range,
            anchor: anchor_verse,
        });
    }
    keys.push(CacheKey::Range {
        book: book.to_string(),
        chapter: anchor.chapter,
        range,
    });
    if range.is_single() {
        keys.push(CacheKey::SingleVerse {
            book: book.to_string(),
            chapter: anchor.chapter,
            verse: range.start,
        });
    }

    Ok(DerivedKeys { keys })
}
