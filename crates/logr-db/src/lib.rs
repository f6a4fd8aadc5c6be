//! # logr-db
//!
//! PostgreSQL database layer for logr.
//!
//! This crate provides:
//! - Connection pool management
//! - Idempotent schema initialization (tables, indices, the weighted
//!   `search_vector` trigger, pgvector column)
//! - Repository implementations for log entries, events, spans, API
//!   keys, stats, retrieval, embeddings, and retention

pub mod api_keys;
pub mod embeddings;
pub mod logs;
pub mod pool;
pub mod retention;
pub mod schema;
pub mod search;
pub mod spans;
pub mod stats;

// Re-export core types
pub use logr_core::*;

/// Escape LIKE/ILIKE wildcard characters (`%`, `_`, `\`) in user input.
pub fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

pub use api_keys::{generate_api_key, hash_api_key, key_prefix, PgApiKeyRepository};
pub use embeddings::PgEmbeddingRepository;
pub use logs::PgLogRepository;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use retention::PgRetentionRepository;
pub use schema::init_schema;
pub use search::{PgSearchRepository, ReferenceLog, SearchFilters};
pub use spans::{build_span_tree, PgSpanRepository};
pub use stats::{PgStatsRepository, WindowStats};

/// Combined database context with all repositories.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Log entry repository (ingest, point reads, listing, traces).
    pub logs: PgLogRepository,
    /// Span repository (ingest, listing, trace trees).
    pub spans: PgSpanRepository,
    /// Stats and anomaly-window aggregations.
    pub stats: PgStatsRepository,
    /// Retrieval queries for the ensemble search engine.
    pub search: PgSearchRepository,
    /// Embedding eligibility scan and write-back.
    pub embeddings: PgEmbeddingRepository,
    /// API key and service account repository.
    pub api_keys: PgApiKeyRepository,
    /// Retention cleanup.
    pub retention: PgRetentionRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            logs: PgLogRepository::new(pool.clone()),
            spans: PgSpanRepository::new(pool.clone()),
            stats: PgStatsRepository::new(pool.clone()),
            search: PgSearchRepository::new(pool.clone()),
            embeddings: PgEmbeddingRepository::new(pool.clone()),
            api_keys: PgApiKeyRepository::new(pool.clone()),
            retention: PgRetentionRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run idempotent schema initialization. Returns whether the
    /// pgvector extension is available.
    pub async fn init_schema(&self, embedding_dimensions: usize) -> Result<bool> {
        schema::init_schema(&self.pool, embedding_dimensions).await
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("a_b"), "a\\_b");
        assert_eq!(escape_like("back\\slash"), "back\\\\slash");
        assert_eq!(escape_like("plain"), "plain");
    }
}
