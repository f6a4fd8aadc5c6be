//! Retrieval SQL for the ensemble search engine.
//!
//! Three retrievers share one filter set:
//! - BM25: `websearch_to_tsquery('english', q)` against the weighted
//!   `search_vector`, ranked by cover-density `ts_rank_cd(sv, q, 32)`.
//! - Vector: pgvector cosine similarity `1 - (embedding <=> $q)`.
//! - Text: ILIKE substring fallback ranked by recency.

use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use logr_core::{Candidate, Error, LogLevel, Result};

use crate::escape_like;

/// Filters shared by every retriever.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub service: Option<String>,
    pub level: Option<LogLevel>,
    pub since: Option<DateTime<Utc>>,
}

/// Reference entry for similar-log search.
#[derive(Debug, Clone)]
pub struct ReferenceLog {
    pub id: Uuid,
    pub message: String,
    pub trace_id: Option<String>,
    pub embedding: Option<Vector>,
}

const CANDIDATE_COLUMNS: &str = "id, service, level, message, timestamp, trace_id, error_type";

/// PostgreSQL implementation of the retrieval queries.
pub struct PgSearchRepository {
    pool: Pool<Postgres>,
}

impl PgSearchRepository {
    /// Create a new PgSearchRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Lexical retrieval over the weighted tsvector index.
    pub async fn bm25(
        &self,
        query: &str,
        filters: &SearchFilters,
        limit: i64,
    ) -> Result<Vec<Candidate>> {
        let (filter_clause, next) = filter_sql(filters, 2);
        let sql = format!(
            "SELECT {CANDIDATE_COLUMNS}, \
                    ts_rank_cd(search_vector, websearch_to_tsquery('english', $1), 32) AS score \
             FROM log_entries \
             WHERE search_vector @@ websearch_to_tsquery('english', $1) {filter_clause} \
             ORDER BY score DESC \
             LIMIT ${next}"
        );

        let q = bind_filters(sqlx::query(&sql).bind(query), filters).bind(limit);
        let rows = q.fetch_all(&self.pool).await.map_err(Error::Database)?;
        rows.into_iter().map(map_candidate_row).collect()
    }

    /// Dense-vector retrieval by cosine similarity.
    pub async fn vector(
        &self,
        query_embedding: &Vector,
        filters: &SearchFilters,
        limit: i64,
    ) -> Result<Vec<Candidate>> {
        let (filter_clause, next) = filter_sql(filters, 2);
        let sql = format!(
            "SELECT {CANDIDATE_COLUMNS}, \
                    (1 - (embedding <=> $1))::float4 AS score \
             FROM log_entries \
             WHERE embedding IS NOT NULL {filter_clause} \
             ORDER BY embedding <=> $1 ASC \
             LIMIT ${next}"
        );

        let q = bind_filters(sqlx::query(&sql).bind(query_embedding.clone()), filters).bind(limit);
        let rows = q.fetch_all(&self.pool).await.map_err(Error::Database)?;
        rows.into_iter().map(map_candidate_row).collect()
    }

    /// ILIKE substring fallback, most recent first.
    pub async fn text(
        &self,
        query: &str,
        filters: &SearchFilters,
        limit: i64,
    ) -> Result<Vec<Candidate>> {
        let (filter_clause, next) = filter_sql(filters, 2);
        let sql = format!(
            "SELECT {CANDIDATE_COLUMNS}, 0::float4 AS score \
             FROM log_entries \
             WHERE message ILIKE $1 {filter_clause} \
             ORDER BY timestamp DESC \
             LIMIT ${next}"
        );

        let pattern = format!("%{}%", escape_like(query));
        let q = bind_filters(sqlx::query(&sql).bind(pattern), filters).bind(limit);
        let rows = q.fetch_all(&self.pool).await.map_err(Error::Database)?;
        rows.into_iter().map(map_candidate_row).collect()
    }

    /// Vector retrieval against a reference embedding, excluding the
    /// reference entry itself and optionally its trace.
    pub async fn similar_by_vector(
        &self,
        reference: &Vector,
        exclude_id: Uuid,
        exclude_trace_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Candidate>> {
        let trace_clause = if exclude_trace_id.is_some() {
            "AND (trace_id IS NULL OR trace_id <> $3)"
        } else {
            ""
        };
        let next = if exclude_trace_id.is_some() { 4 } else { 3 };
        let sql = format!(
            "SELECT {CANDIDATE_COLUMNS}, \
                    (1 - (embedding <=> $1))::float4 AS score \
             FROM log_entries \
             WHERE embedding IS NOT NULL AND id <> $2 {trace_clause} \
             ORDER BY embedding <=> $1 ASC \
             LIMIT ${next}"
        );

        let mut q = sqlx::query(&sql).bind(reference.clone()).bind(exclude_id);
        if let Some(trace_id) = exclude_trace_id {
            q = q.bind(trace_id.to_string());
        }
        let rows = q
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        rows.into_iter().map(map_candidate_row).collect()
    }

    /// Load a reference entry for similar-log search. The embedding
    /// decodes to `None` when absent or when the column is not a
    /// pgvector column (extension unavailable).
    pub async fn fetch_reference(&self, id: Uuid) -> Result<ReferenceLog> {
        let row = sqlx::query(
            "SELECT id, message, trace_id, embedding FROM log_entries WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or(Error::LogNotFound(id))?;

        let embedding = row.try_get::<Option<Vector>, _>("embedding").unwrap_or(None);

        Ok(ReferenceLog {
            id: row.get("id"),
            message: row.get("message"),
            trace_id: row.get("trace_id"),
            embedding,
        })
    }
}

/// Render the shared filter predicates starting at placeholder
/// `$first`; returns the clause and the next free placeholder index.
fn filter_sql(filters: &SearchFilters, first: usize) -> (String, usize) {
    let mut clause = String::new();
    let mut next = first;

    if filters.service.is_some() {
        clause.push_str(&format!(" AND service = ${next}"));
        next += 1;
    }
    if filters.level.is_some() {
        clause.push_str(&format!(" AND level = ${next}"));
        next += 1;
    }
    if filters.since.is_some() {
        clause.push_str(&format!(" AND timestamp >= ${next}"));
        next += 1;
    }
    (clause, next)
}

fn bind_filters<'q>(
    mut q: sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>,
    filters: &SearchFilters,
) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
    if let Some(service) = &filters.service {
        q = q.bind(service.clone());
    }
    if let Some(level) = filters.level {
        q = q.bind(level.as_str());
    }
    if let Some(since) = filters.since {
        q = q.bind(since);
    }
    q
}

fn map_candidate_row(row: sqlx::postgres::PgRow) -> Result<Candidate> {
    let level: LogLevel = row.get::<String, _>("level").parse()?;

    Ok(Candidate {
        id: row.get("id"),
        service: row.get("service"),
        level,
        message: row.get("message"),
        timestamp: row.get("timestamp"),
        trace_id: row.get("trace_id"),
        error_type: row.get("error_type"),
        score: row.get("score"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_sql_empty() {
        let (clause, next) = filter_sql(&SearchFilters::default(), 2);
        assert_eq!(clause, "");
        assert_eq!(next, 2);
    }

    #[test]
    fn test_filter_sql_all_set() {
        let filters = SearchFilters {
            service: Some("taskr-bot".into()),
            level: Some(LogLevel::Error),
            since: Some(Utc::now()),
        };
        let (clause, next) = filter_sql(&filters, 2);
        assert_eq!(
            clause,
            " AND service = $2 AND level = $3 AND timestamp >= $4"
        );
        assert_eq!(next, 5);
    }

    #[test]
    fn test_filter_sql_partial() {
        let filters = SearchFilters {
            service: None,
            level: Some(LogLevel::Warn),
            since: None,
        };
        let (clause, next) = filter_sql(&filters, 2);
        assert_eq!(clause, " AND level = $2");
        assert_eq!(next, 3);
    }
}
