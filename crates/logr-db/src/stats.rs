//! Time-windowed aggregations over log entries.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use sqlx::{Pool, Postgres, Row};

use logr_core::{
    defaults, Error, ErrorGroup, ErrorTypeCount, LatencyStats, LogStats, ModelUsage, Result,
    ServiceCount,
};

/// Aggregates for one anomaly-comparison window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowStats {
    pub total: i64,
    pub errors: i64,
    pub avg_latency_ms: Option<f64>,
    pub error_types: Vec<String>,
}

impl WindowStats {
    /// Errors as a fraction of total entries; 0 for an empty window.
    pub fn error_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.errors as f64 / self.total as f64
        }
    }
}

/// PostgreSQL implementation of the stats repository.
pub struct PgStatsRepository {
    pool: Pool<Postgres>,
}

impl PgStatsRepository {
    /// Create a new PgStatsRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Aggregate the last `hours` hours, optionally scoped to one
    /// service. `hours` must already be clamped to 1..=168.
    pub async fn stats(&self, service: Option<&str>, hours: i64) -> Result<LogStats> {
        let since = Utc::now() - Duration::hours(hours);

        // Every sub-aggregation shares the same window predicate; the
        // service filter is a no-op when NULL.
        const SCOPE: &str = "timestamp >= $1 AND ($2::text IS NULL OR service = $2)";

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM log_entries WHERE {SCOPE}"
        ))
        .bind(since)
        .bind(service)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        let by_level = self.by_level(since, service).await?;
        let by_service = self.by_service(since, service).await?;
        let by_model = self.by_model(since, service).await?;
        let by_error = self.by_error(since, service).await?;
        let latency = self.latency(since, service).await?;

        Ok(LogStats {
            time_window_hours: hours,
            service: service.map(String::from),
            total,
            by_level,
            by_service,
            by_model,
            by_error,
            latency,
        })
    }

    async fn by_level(
        &self,
        since: DateTime<Utc>,
        service: Option<&str>,
    ) -> Result<BTreeMap<String, i64>> {
        let rows = sqlx::query(
            "SELECT level, COUNT(*) AS count FROM log_entries \
             WHERE timestamp >= $1 AND ($2::text IS NULL OR service = $2) \
             GROUP BY level",
        )
        .bind(since)
        .bind(service)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get("level"), row.get("count")))
            .collect())
    }

    async fn by_service(
        &self,
        since: DateTime<Utc>,
        service: Option<&str>,
    ) -> Result<Vec<ServiceCount>> {
        let rows = sqlx::query(
            "SELECT service, COUNT(*) AS count FROM log_entries \
             WHERE timestamp >= $1 AND ($2::text IS NULL OR service = $2) \
             GROUP BY service ORDER BY count DESC LIMIT $3",
        )
        .bind(since)
        .bind(service)
        .bind(defaults::STATS_TOP_SERVICES)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| ServiceCount {
                service: row.get("service"),
                count: row.get("count"),
            })
            .collect())
    }

    async fn by_model(
        &self,
        since: DateTime<Utc>,
        service: Option<&str>,
    ) -> Result<Vec<ModelUsage>> {
        let rows = sqlx::query(
            "SELECT model, COUNT(*) AS count, \
                    COALESCE(SUM(tokens_in), 0)::bigint AS tokens_in, \
                    COALESCE(SUM(tokens_out), 0)::bigint AS tokens_out, \
                    COALESCE(SUM(cost_usd), 0)::double precision AS cost_usd \
             FROM log_entries \
             WHERE timestamp >= $1 AND ($2::text IS NULL OR service = $2) \
               AND model IS NOT NULL \
             GROUP BY model ORDER BY count DESC",
        )
        .bind(since)
        .bind(service)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| ModelUsage {
                model: row.get("model"),
                count: row.get("count"),
                tokens_in: row.get("tokens_in"),
                tokens_out: row.get("tokens_out"),
                cost_usd: row.get("cost_usd"),
            })
            .collect())
    }

    async fn by_error(
        &self,
        since: DateTime<Utc>,
        service: Option<&str>,
    ) -> Result<Vec<ErrorTypeCount>> {
        let rows = sqlx::query(
            "SELECT error_type, COUNT(*) AS count FROM log_entries \
             WHERE timestamp >= $1 AND ($2::text IS NULL OR service = $2) \
               AND error_type IS NOT NULL \
             GROUP BY error_type ORDER BY count DESC LIMIT $3",
        )
        .bind(since)
        .bind(service)
        .bind(defaults::STATS_TOP_ERRORS)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| ErrorTypeCount {
                error_type: row.get("error_type"),
                count: row.get("count"),
            })
            .collect())
    }

    async fn latency(
        &self,
        since: DateTime<Utc>,
        service: Option<&str>,
    ) -> Result<Option<LatencyStats>> {
        let row = sqlx::query(
            "SELECT AVG(duration_ms) AS avg_ms, \
                    MIN(duration_ms) AS min_ms, \
                    MAX(duration_ms) AS max_ms, \
                    PERCENTILE_CONT(0.5) WITHIN GROUP (ORDER BY duration_ms) AS p50_ms, \
                    PERCENTILE_CONT(0.95) WITHIN GROUP (ORDER BY duration_ms) AS p95_ms, \
                    PERCENTILE_CONT(0.99) WITHIN GROUP (ORDER BY duration_ms) AS p99_ms \
             FROM log_entries \
             WHERE timestamp >= $1 AND ($2::text IS NULL OR service = $2) \
               AND duration_ms IS NOT NULL",
        )
        .bind(since)
        .bind(service)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        let avg: Option<f64> = row.get("avg_ms");
        Ok(avg.map(|avg_ms| LatencyStats {
            avg_ms,
            min_ms: row.get::<Option<f64>, _>("min_ms").unwrap_or(0.0),
            max_ms: row.get::<Option<f64>, _>("max_ms").unwrap_or(0.0),
            p50_ms: row.get::<Option<f64>, _>("p50_ms").unwrap_or(0.0),
            p95_ms: row.get::<Option<f64>, _>("p95_ms").unwrap_or(0.0),
            p99_ms: row.get::<Option<f64>, _>("p99_ms").unwrap_or(0.0),
        }))
    }

    /// Aggregates for one anomaly window `[start, end)`.
    pub async fn window_stats(
        &self,
        service: Option<&str>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<WindowStats> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, \
                    COUNT(*) FILTER (WHERE level IN ('error', 'fatal')) AS errors, \
                    AVG(duration_ms) AS avg_latency_ms \
             FROM log_entries \
             WHERE timestamp >= $1 AND timestamp < $2 \
               AND ($3::text IS NULL OR service = $3)",
        )
        .bind(start)
        .bind(end)
        .bind(service)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        let error_types: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT error_type FROM log_entries \
             WHERE timestamp >= $1 AND timestamp < $2 \
               AND ($3::text IS NULL OR service = $3) \
               AND error_type IS NOT NULL \
             ORDER BY error_type",
        )
        .bind(start)
        .bind(end)
        .bind(service)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(WindowStats {
            total: row.get("total"),
            errors: row.get("errors"),
            avg_latency_ms: row.get("avg_latency_ms"),
            error_types,
        })
    }

    /// Errors grouped by (error_type, first 100 chars of message),
    /// most frequent first.
    pub async fn grouped_errors(
        &self,
        service: Option<&str>,
        hours: i64,
        limit: i64,
    ) -> Result<Vec<ErrorGroup>> {
        let since = Utc::now() - Duration::hours(hours);

        let rows = sqlx::query(
            "SELECT error_type, \
                    LEFT(message, $4) AS message_prefix, \
                    COUNT(*) AS count, \
                    ARRAY_AGG(DISTINCT service) AS services, \
                    MIN(timestamp) AS first_seen, \
                    MAX(timestamp) AS last_seen \
             FROM log_entries \
             WHERE timestamp >= $1 AND ($2::text IS NULL OR service = $2) \
               AND error_type IS NOT NULL \
             GROUP BY error_type, LEFT(message, $4) \
             ORDER BY count DESC \
             LIMIT $3",
        )
        .bind(since)
        .bind(service)
        .bind(limit)
        .bind(defaults::ERROR_GROUP_PREFIX as i32)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| ErrorGroup {
                error_type: row.get("error_type"),
                message_prefix: row.get("message_prefix"),
                count: row.get("count"),
                services: row.get("services"),
                first_seen: row.get("first_seen"),
                last_seen: row.get("last_seen"),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_rate_empty_window() {
        let stats = WindowStats::default();
        assert_eq!(stats.error_rate(), 0.0);
    }

    #[test]
    fn test_error_rate() {
        let stats = WindowStats {
            total: 120,
            errors: 20,
            avg_latency_ms: None,
            error_types: vec![],
        };
        assert!((stats.error_rate() - 20.0 / 120.0).abs() < f64::EPSILON);
    }
}
