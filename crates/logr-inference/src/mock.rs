//! Mock embedding backend for deterministic testing.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use logr_core::{EmbeddingBackend, Error, Result, Vector};

/// Deterministic embedding backend: vectors are seeded from a SHA-256
/// of the input text, so identical texts always embed identically and
/// distinct texts (almost certainly) differ.
#[derive(Clone)]
pub struct MockEmbeddingBackend {
    dimension: usize,
    fail: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl MockEmbeddingBackend {
    /// Create a mock with the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            fail: Arc::new(AtomicBool::new(false)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Switch the backend into (or out of) failure mode; all calls
    /// error while enabled. Models an unreachable provider.
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    /// Number of embed calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vector_for(&self, text: &str) -> Vector {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let seed = hasher.finalize();

        // Stretch the 32-byte digest across the requested dimension.
        let values: Vec<f32> = (0..self.dimension)
            .map(|i| {
                let byte = seed[i % seed.len()];
                let tweak = (i / seed.len()) as f32;
                (byte as f32 + tweak) / 255.0 - 0.5
            })
            .collect();
        Vector::from(values)
    }
}

impl Default for MockEmbeddingBackend {
    fn default() -> Self {
        Self::new(logr_core::defaults::EMBED_DIMENSION)
    }
}

#[async_trait]
impl EmbeddingBackend for MockEmbeddingBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Embedding("mock backend is failing".into()));
        }

        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "mock-embedding"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deterministic_per_text() {
        let backend = MockEmbeddingBackend::new(8);
        let a = backend.embed_texts(&["hello".into()]).await.unwrap();
        let b = backend.embed_texts(&["hello".into()]).await.unwrap();
        assert_eq!(a[0].as_slice(), b[0].as_slice());
    }

    #[tokio::test]
    async fn test_distinct_texts_differ() {
        let backend = MockEmbeddingBackend::new(8);
        let vectors = backend
            .embed_texts(&["hello".into(), "world".into()])
            .await
            .unwrap();
        assert_ne!(vectors[0].as_slice(), vectors[1].as_slice());
    }

    #[tokio::test]
    async fn test_dimension_respected() {
        let backend = MockEmbeddingBackend::new(1536);
        let vectors = backend.embed_texts(&["hello".into()]).await.unwrap();
        assert_eq!(vectors[0].as_slice().len(), 1536);
    }

    #[tokio::test]
    async fn test_failure_mode() {
        let backend = MockEmbeddingBackend::new(8);
        backend.set_failing(true);
        assert!(backend.embed_texts(&["x".into()]).await.is_err());
        backend.set_failing(false);
        assert!(backend.embed_texts(&["x".into()]).await.is_ok());
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_embed_query_helper() {
        let backend = MockEmbeddingBackend::new(8);
        let vector = backend.embed_query("hello").await.unwrap();
        assert_eq!(vector.as_slice().len(), 8);
    }
}
