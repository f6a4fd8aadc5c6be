//! # logr-inference
//!
//! Embedding provider client for logr. Production talks to an
//! OpenAI-compatible `/v1/embeddings` endpoint (Artemis); tests use a
//! deterministic mock.

pub mod artemis;
pub mod mock;

pub use artemis::{ArtemisBackend, ArtemisConfig};
pub use mock::MockEmbeddingBackend;
