//! Retention cleanup for aged-out log entries.
//!
//! Per-service rows in `retention_policies` override the global window;
//! services without a policy use the configured default. Deletes run in
//! batches so a large backlog never holds a long transaction; dependent
//! events cascade.

use chrono::{Duration, Utc};
use sqlx::{Pool, Postgres, Row};
use tracing::info;

use logr_core::{defaults, Error, Result};

/// PostgreSQL implementation of retention cleanup.
pub struct PgRetentionRepository {
    pool: Pool<Postgres>,
}

impl PgRetentionRepository {
    /// Create a new PgRetentionRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Delete entries older than their applicable retention window.
    ///
    /// `global_days = 0` disables the global window; a per-service
    /// policy of 0 keeps that service forever. Returns the total number
    /// of entries deleted.
    pub async fn cleanup(&self, global_days: i64) -> Result<u64> {
        let policies = self.policies().await?;
        let mut total_deleted = 0u64;

        for (service, days) in &policies {
            if *days <= 0 {
                continue;
            }
            let cutoff = Utc::now() - Duration::days(*days);
            total_deleted += self
                .delete_batched(
                    "service = $2 AND timestamp < $1",
                    Some(service.as_str()),
                    cutoff,
                )
                .await?;
        }

        if global_days > 0 {
            let cutoff = Utc::now() - Duration::days(global_days);
            // Services with their own policy are excluded from the
            // global sweep, whatever their window.
            let policy_services: Vec<String> = policies.iter().map(|(s, _)| s.clone()).collect();
            total_deleted += self
                .delete_batched_excluding(&policy_services, cutoff)
                .await?;
        }

        if total_deleted > 0 {
            info!(
                subsystem = "db",
                component = "retention",
                op = "cleanup",
                deleted = total_deleted,
                "Retention cleanup complete"
            );
        }
        Ok(total_deleted)
    }

    /// Per-service retention overrides.
    async fn policies(&self) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query("SELECT service, retention_days FROM retention_policies")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get("service"), row.get::<i32, _>("retention_days") as i64))
            .collect())
    }

    async fn delete_batched(
        &self,
        predicate: &str,
        service: Option<&str>,
        cutoff: chrono::DateTime<Utc>,
    ) -> Result<u64> {
        let sql = format!(
            "DELETE FROM log_entries WHERE id IN ( \
                SELECT id FROM log_entries WHERE {predicate} LIMIT {} \
             )",
            defaults::RETENTION_BATCH_SIZE
        );

        let mut deleted = 0u64;
        loop {
            let mut q = sqlx::query(&sql).bind(cutoff);
            if let Some(service) = service {
                q = q.bind(service.to_string());
            }
            let affected = q
                .execute(&self.pool)
                .await
                .map_err(Error::Database)?
                .rows_affected();
            deleted += affected;
            if affected < defaults::RETENTION_BATCH_SIZE as u64 {
                break;
            }
        }
        Ok(deleted)
    }

    async fn delete_batched_excluding(
        &self,
        excluded_services: &[String],
        cutoff: chrono::DateTime<Utc>,
    ) -> Result<u64> {
        let sql = format!(
            "DELETE FROM log_entries WHERE id IN ( \
                SELECT id FROM log_entries \
                WHERE timestamp < $1 AND NOT (service = ANY($2)) \
                LIMIT {} \
             )",
            defaults::RETENTION_BATCH_SIZE
        );

        let mut deleted = 0u64;
        loop {
            let affected = sqlx::query(&sql)
                .bind(cutoff)
                .bind(excluded_services)
                .execute(&self.pool)
                .await
                .map_err(Error::Database)?
                .rows_affected();
            deleted += affected;
            if affected < defaults::RETENTION_BATCH_SIZE as u64 {
                break;
            }
        }
        Ok(deleted)
    }
}
