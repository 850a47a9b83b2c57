//! Encoding of values stored in the local cache.
//!
//! A value is either a commentary document or an alias pointing at the key
//! that holds the commentary. Aliases let a request whose range was corrected
//! by the generative service find the record stored under the corrected key.
//!
//! Values written by older clients are either plain text or a bare
//! `{"commentary": ...}` object; both read as commentary covering the range of
//! the key they were found under.

use lectio_core::{CacheKey, CommentaryRecord, RandomVerse, SourceTier, VerseRange};
use serde::{Deserialize, Serialize};

/// A decoded local cache value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CachedEntry {
    Commentary(CachedCommentary),
    Alias { key: String },
}

/// Commentary as stored on the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedCommentary {
    pub text: String,
    pub start_verse: u32,
    pub end_verse: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_verse: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub random_verse: Option<RandomVerse>,
}

#[derive(Deserialize)]
struct LegacyCommentary {
    commentary: String,
}

impl CachedEntry {
    pub fn commentary(record: &CommentaryRecord) -> Self {
        CachedEntry::Commentary(CachedCommentary {
            text: record.text.clone(),
            start_verse: record.resolved_range.start,
            end_verse: record.resolved_range.end,
            anchor_verse: record.anchor_verse,
            random_verse: record.random_verse.clone(),
        })
    }

    pub fn alias(target: &CacheKey) -> Self {
        CachedEntry::Alias {
            key: target.to_string(),
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a raw value found under `key`.
    ///
    /// Returns `None` for empty values.
    pub fn decode(raw: &str, key: &CacheKey) -> Option<Self> {
        if raw.trim().is_empty() {
            return None;
        }
        if let Ok(entry) = serde_json::from_str::<CachedEntry>(raw) {
            return Some(entry);
        }
        let text = match serde_json::from_str::<LegacyCommentary>(raw) {
            Ok(legacy) => legacy.commentary,
            Err(_) => raw.to_string(),
        };
        let range = key.range();
        Some(CachedEntry::Commentary(CachedCommentary {
            text,
            start_verse: range.start,
            end_verse: range.end,
            anchor_verse: key.anchor(),
            random_verse: None,
        }))
    }
}

impl CachedCommentary {
    pub fn into_record(self) -> CommentaryRecord {
        CommentaryRecord::new(
            self.text,
            SourceTier::Local,
            VerseRange::new(self.start_verse, self.end_verse),
        )
        .with_anchor_verse(self.anchor_verse)
        .with_random_verse(self.random_verse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> CacheKey {
        CacheKey::most_specific("Genesis", 1, VerseRange::new(1, 3), None)
    }

    #[test]
    fn test_commentary_encodes_with_kind_tag() {
        let record = CommentaryRecord::new("In the beginning", SourceTier::Generated, VerseRange::new(1, 3));
        let raw = CachedEntry::commentary(&record).encode().expect("encode");
        assert!(raw.contains(r#""kind":"commentary""#));

        match CachedEntry::decode(&raw, &key()) {
            Some(CachedEntry::Commentary(c)) => {
                let restored = c.into_record();
                assert_eq!(restored.text, "In the beginning");
                assert_eq!(restored.source_tier, SourceTier::Local);
                assert_eq!(restored.resolved_range, VerseRange::new(1, 3));
            }
            other => panic!("unexpected entry: {:?}", other),
        }
    }

    #[test]
    fn test_alias_points_at_target() {
        let target = CacheKey::most_specific("Genesis", 1, VerseRange::new(5, 7), Some(6));
        let raw = CachedEntry::alias(&target).encode().expect("encode");
        assert_eq!(
            CachedEntry::decode(&raw, &key()),
            Some(CachedEntry::Alias {
                key: "commentary:Genesis:1:5-7:6".to_string()
            })
        );
    }

    #[test]
    fn test_plain_text_reads_as_commentary_for_key_range() {
        match CachedEntry::decode("The light shines in darkness.", &key()) {
            Some(CachedEntry::Commentary(c)) => {
                assert_eq!(c.text, "The light shines in darkness.");
                assert_eq!((c.start_verse, c.end_verse), (1, 3));
            }
            other => panic!("unexpected entry: {:?}", other),
        }
    }

    #[test]
    fn test_legacy_object_reads_commentary_field() {
        match CachedEntry::decode(r#"{"commentary":"Let there be light"}"#, &key()) {
            Some(CachedEntry::Commentary(c)) => assert_eq!(c.text, "Let there be light"),
            other => panic!("unexpected entry: {:?}", other),
        }
    }

    #[test]
    fn test_empty_value_is_absent() {
        assert_eq!(CachedEntry::decode("  ", &key()), None);
    }
}
