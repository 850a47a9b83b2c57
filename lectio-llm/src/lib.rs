//! Lectio LLM - Generative Commentary Service
//!
//! The last tier of the resolver. This crate defines the
//! [`CommentaryGenerator`] trait the resolver calls on a confirmed miss, the
//! request/response wire types, and an HTTP implementation.

use async_trait::async_trait;
use lectio_core::{CommentaryRecord, GenerationError, SourceTier};
use std::sync::Arc;

pub mod client;
pub mod types;

pub use client::HttpCommentaryGenerator;
pub use types::{GenerateResponse, GeneratedCommentary, GenerationRequest};

// ============================================================================
// COMMENTARY GENERATOR TRAIT
// ============================================================================

/// Trait for generative commentary backends.
/// Implementations must be thread-safe (Send + Sync).
///
/// A successful result always carries non-blank commentary and a normalized
/// range; backends report anything else as an error.
#[async_trait]
pub trait CommentaryGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedCommentary, GenerationError>;
}

#[async_trait]
impl<T: CommentaryGenerator + ?Sized> CommentaryGenerator for Arc<T> {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedCommentary, GenerationError> {
        (**self).generate(request).await
    }
}

impl GeneratedCommentary {
    /// Convert into a record tagged as freshly generated.
    pub fn into_record(self) -> CommentaryRecord {
        CommentaryRecord::new(self.commentary, SourceTier::Generated, self.range)
            .with_anchor_verse(self.anchor_verse)
            .with_random_verse(self.random_verse)
    }
}
