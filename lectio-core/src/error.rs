//! Error types for Lectio operations

use thiserror::Error;

/// Malformed passage input. Raised before any I/O happens.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnchorError {
    #[error("Book name is empty")]
    EmptyBook,

    #[error("Unknown book: {book}")]
    UnknownBook { book: String },

    #[error("Invalid {field}: {value} (must be a positive integer)")]
    NotPositive { field: &'static str, value: u32 },

    #[error("{book} has {chapters} chapters, chapter {chapter} is out of range")]
    ChapterOutOfRange {
        book: String,
        chapter: u32,
        chapters: u32,
    },

    #[error("Start verse {start} is after end verse {end}")]
    InvertedRange { start: u32, end: u32 },
}

/// Local (on-device) cache errors. Always absorbed by the resolver.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache read failed for {key}: {reason}")]
    Read { key: String, reason: String },

    #[error("Cache write failed for {key}: {reason}")]
    Write { key: String, reason: String },

    #[error("Failed to open cache: {reason}")]
    Open { reason: String },

    #[error("Malformed cache key: {key}")]
    MalformedKey { key: String },
}

/// Shared remote datastore errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Remote query failed: {reason}")]
    Query { reason: String },

    #[error("Remote insert rejected as duplicate: {reason}")]
    Duplicate { reason: String },

    #[error("Remote insert failed: {reason}")]
    Insert { reason: String },
}

/// Generative commentary service errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Commentary service unreachable: {reason}")]
    Transport { reason: String },

    #[error("Commentary service returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Commentary service returned no commentary")]
    Empty,

    #[error("Invalid response from commentary service: {reason}")]
    InvalidResponse { reason: String },
}

impl GenerationError {
    /// Whether the caller may offer a manual retry with the same input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GenerationError::Transport { .. } | GenerationError::Status { .. })
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },
}

/// Master error type for all Lectio errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LectioError {
    #[error("Invalid anchor: {0}")]
    Anchor(#[from] AnchorError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for Lectio operations.
pub type LectioResult<T> = Result<T, LectioError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anchor_error_display() {
        let err = AnchorError::InvertedRange { start: 7, end: 3 };
        assert_eq!(err.to_string(), "Start verse 7 is after end verse 3");

        let err = AnchorError::NotPositive {
            field: "chapter",
            value: 0,
        };
        assert!(err.to_string().contains("chapter"));
    }

    #[test]
    fn test_generation_error_retryable() {
        assert!(GenerationError::Transport {
            reason: "connection reset".to_string()
        }
        .is_retryable());
        assert!(GenerationError::Status {
            status: 502,
            message: "bad gateway".to_string()
        }
        .is_retryable());
        assert!(!GenerationError::Empty.is_retryable());
    }

    #[test]
    fn test_lectio_error_from_conversions() {
        let err: LectioError = RemoteError::Query {
            reason: "timeout".to_string(),
        }
        .into();
        assert!(matches!(err, LectioError::Remote(_)));
        assert!(err.to_string().starts_with("Remote error:"));

        let err: LectioError = AnchorError::EmptyBook.into();
        assert_eq!(err, LectioError::Anchor(AnchorError::EmptyBook));
    }
}
