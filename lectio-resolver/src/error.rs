//! Terminal resolution failures.

use lectio_core::{AnchorError, GenerationError, LectioError, RemoteError};
use thiserror::Error;

/// Why a resolution ended in the `Errored` state.
///
/// Local cache failures never appear here; they are absorbed as misses.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Invalid passage: {0}")]
    InvalidAnchor(#[from] AnchorError),

    #[error("Remote lookup failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("Commentary generation failed: {0}")]
    Generation(#[from] GenerationError),

    /// The task driving the resolution stopped before producing a result.
    #[error("Resolution aborted: {reason}")]
    Aborted { reason: String },
}

impl ResolveError {
    /// One descriptive sentence the presentation layer can show as-is.
    pub fn user_message(&self) -> String {
        match self {
            ResolveError::InvalidAnchor(err) => format!("That passage could not be found: {}.", err),
            ResolveError::Remote(_) => {
                "Could not reach the commentary library. Check your connection and try again."
                    .to_string()
            }
            ResolveError::Generation(GenerationError::Empty) => {
                "No commentary was produced for this passage. Try a different passage.".to_string()
            }
            ResolveError::Generation(GenerationError::Transport { .. }) => {
                "Could not reach the commentary service. Check your connection and try again."
                    .to_string()
            }
            ResolveError::Generation(GenerationError::Status { status, .. }) => format!(
                "The commentary service is unavailable right now (status {}). Please try again.",
                status
            ),
            ResolveError::Generation(GenerationError::InvalidResponse { .. }) => {
                "The commentary service sent an unreadable reply. Please try again.".to_string()
            }
            ResolveError::Aborted { .. } => {
                "Loading the commentary was interrupted. Please try again.".to_string()
            }
        }
    }

    /// Whether offering a manual retry with the same passage makes sense.
    pub fn is_retryable(&self) -> bool {
        match self {
            ResolveError::InvalidAnchor(_) => false,
            ResolveError::Remote(_) | ResolveError::Aborted { .. } => true,
            ResolveError::Generation(err) => err.is_retryable(),
        }
    }
}

impl From<ResolveError> for LectioError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::InvalidAnchor(e) => LectioError::Anchor(e),
            ResolveError::Remote(e) => LectioError::Remote(e),
            ResolveError::Generation(e) => LectioError::Generation(e),
            ResolveError::Aborted { reason } => LectioError::Generation(GenerationError::Transport { reason }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages_are_single_sentences() {
        let errors = vec![
            ResolveError::InvalidAnchor(AnchorError::EmptyBook),
            ResolveError::Remote(RemoteError::Query {
                reason: "timeout".to_string(),
            }),
            ResolveError::Generation(GenerationError::Empty),
            ResolveError::Generation(GenerationError::Transport {
                reason: "dns".to_string(),
            }),
            ResolveError::Generation(GenerationError::Status {
                status: 502,
                message: "bad gateway".to_string(),
            }),
            ResolveError::Aborted {
                reason: "panic".to_string(),
            },
        ];
        for err in errors {
            let message = err.user_message();
            assert!(!message.is_empty());
            assert!(!message.contains('\n'), "multi-line message: {}", message);
        }
    }

    #[test]
    fn test_empty_generation_not_retryable() {
        assert!(!ResolveError::Generation(GenerationError::Empty).is_retryable());
        assert!(ResolveError::Generation(GenerationError::Transport {
            reason: "reset".to_string()
        })
        .is_retryable());
        assert!(!ResolveError::InvalidAnchor(AnchorError::EmptyBook).is_retryable());
    }

    #[test]
    fn test_converts_into_lectio_error() {
        let err: LectioError = ResolveError::Remote(RemoteError::Query {
            reason: "down".to_string(),
        })
        .into();
        assert!(matches!(err, LectioError::Remote(_)));
    }
}
