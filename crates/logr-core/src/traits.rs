//! Core traits for logr abstractions.
//!
//! These define the seams between the service and its external
//! collaborators, enabling pluggable backends and testability.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Vector;

/// Backend for generating text embeddings.
///
/// The only external inference dependency this service has. Production
/// uses the Artemis OpenAI-compatible HTTP provider; tests use a
/// deterministic mock.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate embeddings for the given texts, one vector per input,
    /// in input order.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>>;

    /// Generate an embedding for a single query string.
    ///
    /// Callers that can degrade gracefully should map the error arm to
    /// `None` and continue without the vector signal.
    async fn embed_query(&self, text: &str) -> Result<Vector> {
        let texts = [text.to_string()];
        let mut vectors = self.embed_texts(&texts).await?;
        vectors
            .pop()
            .ok_or_else(|| crate::Error::Embedding("provider returned no embedding".into()))
    }

    /// Expected dimension of embedding vectors.
    fn dimension(&self) -> usize;

    /// Model name requested from the provider.
    fn model_name(&self) -> &str;
}
