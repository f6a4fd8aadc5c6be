//! Artemis embedding backend (OpenAI-compatible `/v1/embeddings`).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use logr_core::{defaults, EmbeddingBackend, Error, Result, Vector};

/// Configuration for the Artemis backend.
#[derive(Debug, Clone)]
pub struct ArtemisConfig {
    /// Base URL of the provider.
    pub base_url: String,
    /// Bearer key for authentication.
    pub api_key: String,
    /// Model requested for embeddings.
    pub model: String,
    /// Expected embedding dimension.
    pub dimension: usize,
    /// Request timeout in seconds (batch calls; query callers apply
    /// their own shorter deadline on top).
    pub timeout_seconds: u64,
}

impl ArtemisConfig {
    /// Build a config from settings values.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: defaults::EMBED_MODEL.to_string(),
            dimension: defaults::EMBED_DIMENSION,
            timeout_seconds: defaults::EMBED_BATCH_TIMEOUT_SECS,
        }
    }

    /// Set the embedding model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the expected dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

/// Embedding backend talking to an OpenAI-compatible provider.
pub struct ArtemisBackend {
    client: Client,
    config: ArtemisConfig,
}

impl ArtemisBackend {
    /// Create a new backend with the given configuration.
    pub fn new(config: ArtemisConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Embedding(format!("failed to create HTTP client: {e}")))?;

        info!(
            subsystem = "inference",
            component = "artemis",
            url = %config.base_url,
            model = %config.model,
            "Initialized embedding backend"
        );

        Ok(Self { client, config })
    }

    /// Get the current configuration.
    pub fn config(&self) -> &ArtemisConfig {
        &self.config
    }

    fn embeddings_url(&self) -> String {
        format!(
            "{}/v1/embeddings",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl EmbeddingBackend for ArtemisBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        debug!(
            subsystem = "inference",
            component = "artemis",
            op = "embed_texts",
            input_count = texts.len(),
            model = %self.config.model,
            "Requesting embeddings"
        );

        let request = EmbeddingRequest {
            input: texts,
            model: &self.config.model,
        };

        let response = self
            .client
            .post(self.embeddings_url())
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!(
                "provider returned {status}: {body}"
            )));
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("failed to parse response: {e}")))?;

        if result.data.len() != texts.len() {
            return Err(Error::Embedding(format!(
                "provider returned {} embeddings for {} inputs",
                result.data.len(),
                texts.len()
            )));
        }

        // Sort by index so vectors line up with inputs.
        let mut data = result.data;
        data.sort_by_key(|d| d.index);

        for d in &data {
            if d.embedding.len() != self.config.dimension {
                return Err(Error::Embedding(format!(
                    "provider returned dimension {} (expected {})",
                    d.embedding.len(),
                    self.config.dimension
                )));
            }
        }

        Ok(data.into_iter().map(|d| Vector::from(d.embedding)).collect())
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ArtemisConfig::new("https://artemis.example.com", "key");
        assert_eq!(config.model, "text-embedding-3-small");
        assert_eq!(config.dimension, 1536);
        assert_eq!(config.timeout_seconds, 60);
    }

    #[test]
    fn test_embeddings_url_strips_trailing_slash() {
        let backend =
            ArtemisBackend::new(ArtemisConfig::new("https://artemis.example.com/", "key")).unwrap();
        assert_eq!(
            backend.embeddings_url(),
            "https://artemis.example.com/v1/embeddings"
        );
    }

    #[test]
    fn test_request_wire_shape() {
        let input = vec!["hello".to_string()];
        let request = EmbeddingRequest {
            input: &input,
            model: "text-embedding-3-small",
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["input"][0], "hello");
        assert_eq!(json["model"], "text-embedding-3-small");
    }

    #[test]
    fn test_response_parse() {
        let body = r#"{"data": [{"embedding": [0.1, 0.2], "index": 1},
                                {"embedding": [0.3, 0.4], "index": 0}]}"#;
        let parsed: EmbeddingResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.data.len(), 2);
        assert_eq!(parsed.data[0].index, 1);
    }

    #[test]
    fn test_response_parse_without_index() {
        let body = r#"{"data": [{"embedding": [0.1]}]}"#;
        let parsed: EmbeddingResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.data[0].index, 0);
    }

    #[tokio::test]
    async fn test_embed_texts_empty_input_short_circuits() {
        let backend =
            ArtemisBackend::new(ArtemisConfig::new("http://127.0.0.1:9", "key")).unwrap();
        let vectors = backend.embed_texts(&[]).await.unwrap();
        assert!(vectors.is_empty());
    }
}
