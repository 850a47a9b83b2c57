//! Commentary service request and response types

use lectio_core::{GenerationError, PassageAnchor, RandomVerse, VerseRange};
use serde::{Deserialize, Serialize};

// ============================================================================
// REQUEST TYPES
// ============================================================================

/// Body of a generation request.
///
/// The anchor-only shape lets the service choose the surrounding range; the
/// range shape pins it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum GenerationRequest {
    #[serde(rename_all = "camelCase")]
    AnchorOnly {
        book: String,
        chapter: u32,
        anchor_verse: u32,
    },
    #[serde(rename_all = "camelCase")]
    Range {
        book: String,
        chapter: u32,
        start_verse: u32,
        end_verse: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        anchor_verse: Option<u32>,
    },
}

impl GenerationRequest {
    /// Pick the payload shape for a passage. `book` is the canonical name.
    pub fn for_anchor(anchor: &PassageAnchor, book: &str) -> Self {
        match anchor.anchor_verse {
            Some(anchor_verse) if anchor.open_range => GenerationRequest::AnchorOnly {
                book: book.to_string(),
                chapter: anchor.chapter,
                anchor_verse,
            },
            anchor_verse => GenerationRequest::Range {
                book: book.to_string(),
                chapter: anchor.chapter,
                start_verse: anchor.start_verse,
                end_verse: anchor.end_verse,
                anchor_verse,
            },
        }
    }

    pub fn book(&self) -> &str {
        match self {
            GenerationRequest::AnchorOnly { book, .. } | GenerationRequest::Range { book, .. } => {
                book
            }
        }
    }

    pub fn chapter(&self) -> u32 {
        match self {
            GenerationRequest::AnchorOnly { chapter, .. }
            | GenerationRequest::Range { chapter, .. } => *chapter,
        }
    }

    pub fn anchor_verse(&self) -> Option<u32> {
        match self {
            GenerationRequest::AnchorOnly { anchor_verse, .. } => Some(*anchor_verse),
            GenerationRequest::Range { anchor_verse, .. } => *anchor_verse,
        }
    }

    /// Range to assume when the service does not report one.
    pub fn fallback_range(&self) -> VerseRange {
        match self {
            GenerationRequest::AnchorOnly { anchor_verse, .. } => {
                VerseRange::new(*anchor_verse, *anchor_verse)
            }
            GenerationRequest::Range {
                start_verse,
                end_verse,
                ..
            } => VerseRange::new(*start_verse, *end_verse),
        }
    }
}

// ============================================================================
// RESPONSE TYPES
// ============================================================================

/// Raw response body as sent by the service.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    #[serde(default)]
    pub commentary: Option<String>,
    #[serde(default)]
    pub start_verse: Option<u32>,
    #[serde(default)]
    pub end_verse: Option<u32>,
    /// Echoed by some deployments; never replaces the requested anchor
    #[serde(default)]
    pub anchor_verse: Option<u32>,
    #[serde(default)]
    pub random_verse: Option<RandomVerse>,
}

/// Normalized generation result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedCommentary {
    pub commentary: String,
    /// Range the service actually commented on
    pub range: VerseRange,
    pub anchor_verse: Option<u32>,
    pub random_verse: Option<RandomVerse>,
}

impl GenerateResponse {
    /// Normalize against the request that produced this response.
    ///
    /// A missing or blank commentary is [`GenerationError::Empty`]. Missing
    /// bounds fall back to the requested range; reversed bounds are reordered.
    /// The anchor verse is always the requested one, so a range-only request
    /// stays range-only.
    pub fn normalize(self, request: &GenerationRequest) -> Result<GeneratedCommentary, GenerationError> {
        let commentary = match self.commentary {
            Some(text) if !text.trim().is_empty() => text,
            _ => return Err(GenerationError::Empty),
        };

        let fallback = request.fallback_range();
        let range = VerseRange::new(
            self.start_verse.filter(|v| *v > 0).unwrap_or(fallback.start),
            self.end_verse.filter(|v| *v > 0).unwrap_or(fallback.end),
        );

        Ok(GeneratedCommentary {
            commentary,
            range,
            anchor_verse: request.anchor_verse(),
            random_verse: self.random_verse,
        })
    }
}

// ============================================================================
// SHARED TYPES
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ApiError {
    pub fn into_message(self) -> Option<String> {
        self.error.or(self.message)
    }
}
