//! Embedding write-back support for the background pipeline.

use pgvector::Vector;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use logr_core::{defaults, Error, Result};

/// PostgreSQL implementation of the embedding repository.
pub struct PgEmbeddingRepository {
    pool: Pool<Postgres>,
}

impl PgEmbeddingRepository {
    /// Create a new PgEmbeddingRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Rows eligible for embedding, newest first.
    ///
    /// Eligible means: no embedding yet, not from an excluded service
    /// (loop prevention), not debug level, and message long enough to
    /// be worth a vector.
    pub async fn eligible_rows(&self, limit: i64) -> Result<Vec<(Uuid, String)>> {
        let excluded_services: Vec<String> = defaults::PIPELINE_EXCLUDED_SERVICES
            .iter()
            .map(|s| s.to_string())
            .collect();
        let excluded_levels: Vec<String> = defaults::PIPELINE_EXCLUDED_LEVELS
            .iter()
            .map(|s| s.to_string())
            .collect();

        let rows = sqlx::query(
            "SELECT id, message FROM log_entries \
             WHERE embedding IS NULL \
               AND NOT (service = ANY($1)) \
               AND NOT (level = ANY($2)) \
               AND length(message) >= $3 \
             ORDER BY timestamp DESC \
             LIMIT $4",
        )
        .bind(&excluded_services)
        .bind(&excluded_levels)
        .bind(defaults::PIPELINE_MIN_MESSAGE_LENGTH)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get("id"), row.get("message")))
            .collect())
    }

    /// Write vectors back for a batch of rows in one transaction.
    ///
    /// The `embedding IS NULL` guard makes re-embedding impossible, and
    /// a row deleted since the eligibility scan is simply skipped.
    /// Returns the number of rows actually updated.
    pub async fn store_embeddings(
        &self,
        updates: &[(Uuid, Vector)],
        model: &str,
    ) -> Result<usize> {
        if updates.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let mut written = 0usize;

        for (id, vector) in updates {
            let result = sqlx::query(
                "UPDATE log_entries \
                 SET embedding = $1, embedding_model = $2 \
                 WHERE id = $3 AND embedding IS NULL",
            )
            .bind(vector.clone())
            .bind(model)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

            written += result.rows_affected() as usize;
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(written)
    }
}
