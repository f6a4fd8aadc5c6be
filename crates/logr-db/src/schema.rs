//! Idempotent schema initialization.
//!
//! Creates the vector extension (tolerated when unavailable), all
//! tables, the composite indices that bound query latency, the
//! weighted-tsvector trigger on `log_entries`, and backfills
//! `search_vector` for any pre-existing rows. Every statement is safe
//! to re-run; startup calls this unconditionally.

use sqlx::PgPool;
use tracing::{info, warn};

use logr_core::{Error, Result};

/// Run idempotent schema initialization against the pool.
///
/// Returns whether the `vector` extension is available; when it is
/// not, `log_entries.embedding` falls back to a text column and vector
/// search degrades at the engine layer.
pub async fn init_schema(pool: &PgPool, embedding_dimensions: usize) -> Result<bool> {
    let vector_available = ensure_vector_extension(pool).await;

    let embedding_type = if vector_available {
        format!("vector({embedding_dimensions})")
    } else {
        "TEXT".to_string()
    };

    create_log_entries(pool, &embedding_type).await?;
    create_log_events(pool).await?;
    create_spans(pool).await?;
    create_api_keys(pool).await?;
    create_service_accounts(pool).await?;
    create_retention_policies(pool).await?;
    create_search_vector_trigger(pool).await?;
    backfill_search_vector(pool).await?;

    info!(
        subsystem = "db",
        component = "schema",
        op = "init",
        vector_available,
        "Schema initialization complete"
    );
    Ok(vector_available)
}

/// Try to create the pgvector extension. Missing extension is not
/// fatal: semantic search degrades, everything else keeps working.
async fn ensure_vector_extension(pool: &PgPool) -> bool {
    if let Err(e) = sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
        .execute(pool)
        .await
    {
        warn!(
            subsystem = "db",
            component = "schema",
            error = %e,
            "pgvector extension unavailable, vector search disabled"
        );
    }

    sqlx::query_scalar::<_, i32>("SELECT 1 FROM pg_extension WHERE extname = 'vector'")
        .fetch_optional(pool)
        .await
        .ok()
        .flatten()
        .is_some()
}

async fn create_log_entries(pool: &PgPool, embedding_type: &str) -> Result<()> {
    let sql = format!(
        r#"
        CREATE TABLE IF NOT EXISTS log_entries (
            id UUID PRIMARY KEY,
            service VARCHAR(100) NOT NULL,
            environment VARCHAR(50) NOT NULL DEFAULT 'production',
            host VARCHAR(255),
            version VARCHAR(100),
            level VARCHAR(20) NOT NULL,
            message TEXT NOT NULL,
            context JSONB NOT NULL DEFAULT '{{}}'::jsonb,
            trace_id VARCHAR(100),
            span_id VARCHAR(100),
            parent_span_id VARCHAR(100),
            request_id VARCHAR(100),
            user_id VARCHAR(100),
            session_id VARCHAR(100),
            timestamp TIMESTAMPTZ NOT NULL,
            duration_ms DOUBLE PRECISION,
            model VARCHAR(100),
            tokens_in BIGINT,
            tokens_out BIGINT,
            cost_usd DOUBLE PRECISION,
            error_type VARCHAR(255),
            error_message TEXT,
            stack_trace TEXT,
            embedding {embedding_type},
            embedding_model VARCHAR(100),
            search_vector tsvector,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#
    );
    sqlx::query(&sql).execute(pool).await.map_err(Error::Database)?;

    // Single-column and composite indices; composites bound the latency
    // of the common filter shapes.
    for stmt in [
        "CREATE INDEX IF NOT EXISTS ix_log_entries_service ON log_entries (service)",
        "CREATE INDEX IF NOT EXISTS ix_log_entries_environment ON log_entries (environment)",
        "CREATE INDEX IF NOT EXISTS ix_log_entries_level ON log_entries (level)",
        "CREATE INDEX IF NOT EXISTS ix_log_entries_timestamp ON log_entries (timestamp)",
        "CREATE INDEX IF NOT EXISTS ix_log_entries_trace_id ON log_entries (trace_id)",
        "CREATE INDEX IF NOT EXISTS ix_log_entries_request_id ON log_entries (request_id)",
        "CREATE INDEX IF NOT EXISTS ix_log_entries_user_id ON log_entries (user_id)",
        "CREATE INDEX IF NOT EXISTS ix_log_entries_service_timestamp ON log_entries (service, timestamp)",
        "CREATE INDEX IF NOT EXISTS ix_log_entries_level_timestamp ON log_entries (level, timestamp)",
        "CREATE INDEX IF NOT EXISTS ix_log_entries_service_level ON log_entries (service, level)",
        "CREATE INDEX IF NOT EXISTS ix_log_entries_trace_timestamp ON log_entries (trace_id, timestamp)",
        "CREATE INDEX IF NOT EXISTS ix_log_entries_error_timestamp ON log_entries (error_type, timestamp)",
        "CREATE INDEX IF NOT EXISTS ix_log_entries_model_timestamp ON log_entries (model, timestamp)",
        "CREATE INDEX IF NOT EXISTS ix_log_entries_search_vector ON log_entries USING GIN (search_vector)",
    ] {
        sqlx::query(stmt).execute(pool).await.map_err(Error::Database)?;
    }

    Ok(())
}

async fn create_log_events(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS log_events (
            id UUID PRIMARY KEY,
            log_entry_id UUID NOT NULL REFERENCES log_entries(id) ON DELETE CASCADE,
            event_type VARCHAR(50) NOT NULL,
            content TEXT NOT NULL,
            content_type VARCHAR(100),
            event_metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
            sequence INTEGER NOT NULL DEFAULT 0,
            duration_ms DOUBLE PRECISION,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(Error::Database)?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS ix_log_events_log_entry_id ON log_events (log_entry_id)",
    )
    .execute(pool)
    .await
    .map_err(Error::Database)?;

    Ok(())
}

async fn create_spans(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS spans (
            id UUID PRIMARY KEY,
            trace_id VARCHAR(100) NOT NULL,
            span_id VARCHAR(100) NOT NULL,
            parent_span_id VARCHAR(100),
            service VARCHAR(100) NOT NULL,
            operation VARCHAR(255) NOT NULL,
            kind VARCHAR(20) NOT NULL DEFAULT 'internal',
            start_time TIMESTAMPTZ NOT NULL,
            end_time TIMESTAMPTZ,
            duration_ms DOUBLE PRECISION,
            status VARCHAR(20) NOT NULL DEFAULT 'unset',
            status_message TEXT,
            attributes JSONB NOT NULL DEFAULT '{}'::jsonb,
            resource JSONB NOT NULL DEFAULT '{}'::jsonb,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            CONSTRAINT uq_spans_trace_span UNIQUE (trace_id, span_id)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(Error::Database)?;

    for stmt in [
        "CREATE INDEX IF NOT EXISTS ix_spans_trace_id ON spans (trace_id)",
        "CREATE INDEX IF NOT EXISTS ix_spans_service ON spans (service)",
        "CREATE INDEX IF NOT EXISTS ix_spans_start_time ON spans (start_time)",
    ] {
        sqlx::query(stmt).execute(pool).await.map_err(Error::Database)?;
    }

    Ok(())
}

async fn create_api_keys(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS api_keys (
            id UUID PRIMARY KEY,
            name VARCHAR(100) NOT NULL,
            description TEXT,
            key_hash VARCHAR(64) NOT NULL UNIQUE,
            key_prefix VARCHAR(12) NOT NULL,
            can_write INTEGER NOT NULL DEFAULT 1,
            can_read INTEGER NOT NULL DEFAULT 1,
            can_admin INTEGER NOT NULL DEFAULT 0,
            revoked INTEGER NOT NULL DEFAULT 0,
            revoked_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            last_used_at TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(Error::Database)?;

    sqlx::query("CREATE INDEX IF NOT EXISTS ix_api_keys_key_hash ON api_keys (key_hash)")
        .execute(pool)
        .await
        .map_err(Error::Database)?;

    Ok(())
}

async fn create_service_accounts(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS service_accounts (
            id UUID PRIMARY KEY,
            name VARCHAR(100) NOT NULL UNIQUE,
            description TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(Error::Database)?;
    Ok(())
}

async fn create_retention_policies(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS retention_policies (
            id UUID PRIMARY KEY,
            service VARCHAR(100) NOT NULL UNIQUE,
            retention_days INTEGER NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(Error::Database)?;
    Ok(())
}

/// Weighted-tsvector expression shared by the trigger and the backfill.
///
/// Weights: message A, service B, error_type B, error_message C.
const SEARCH_VECTOR_EXPR: &str = r#"
    setweight(to_tsvector('english', coalesce({prefix}message, '')), 'A') ||
    setweight(to_tsvector('english', coalesce({prefix}service, '')), 'B') ||
    setweight(to_tsvector('english', coalesce({prefix}error_type, '')), 'B') ||
    setweight(to_tsvector('english', coalesce({prefix}error_message, '')), 'C')
"#;

async fn create_search_vector_trigger(pool: &PgPool) -> Result<()> {
    let expr = SEARCH_VECTOR_EXPR.replace("{prefix}", "NEW.");

    let function = format!(
        r#"
        CREATE OR REPLACE FUNCTION log_entries_search_vector_update() RETURNS trigger AS $fn$
        BEGIN
            NEW.search_vector := {expr};
            RETURN NEW;
        END
        $fn$ LANGUAGE plpgsql
        "#
    );
    sqlx::query(&function)
        .execute(pool)
        .await
        .map_err(Error::Database)?;

    sqlx::query("DROP TRIGGER IF EXISTS trg_log_entries_search_vector ON log_entries")
        .execute(pool)
        .await
        .map_err(Error::Database)?;

    sqlx::query(
        r#"
        CREATE TRIGGER trg_log_entries_search_vector
            BEFORE INSERT OR UPDATE OF message, service, error_type, error_message
            ON log_entries
            FOR EACH ROW
            EXECUTE FUNCTION log_entries_search_vector_update()
        "#,
    )
    .execute(pool)
    .await
    .map_err(Error::Database)?;

    Ok(())
}

/// Populate `search_vector` for rows inserted before the trigger
/// existed. After this runs once, the invariant "search_vector is
/// never NULL" holds for every row.
async fn backfill_search_vector(pool: &PgPool) -> Result<()> {
    let expr = SEARCH_VECTOR_EXPR.replace("{prefix}", "");
    let sql = format!(
        "UPDATE log_entries SET search_vector = {expr} WHERE search_vector IS NULL"
    );

    let result = sqlx::query(&sql)
        .execute(pool)
        .await
        .map_err(Error::Database)?;

    if result.rows_affected() > 0 {
        info!(
            subsystem = "db",
            component = "schema",
            op = "backfill",
            rows = result.rows_affected(),
            "Backfilled search_vector for pre-existing rows"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_vector_expr_weights() {
        let expr = SEARCH_VECTOR_EXPR.replace("{prefix}", "NEW.");
        assert!(expr.contains("NEW.message, '')), 'A'"));
        assert!(expr.contains("NEW.service, '')), 'B'"));
        assert!(expr.contains("NEW.error_type, '')), 'B'"));
        assert!(expr.contains("NEW.error_message, '')), 'C'"));
    }

    #[test]
    fn test_backfill_expr_has_no_row_prefix() {
        let expr = SEARCH_VECTOR_EXPR.replace("{prefix}", "");
        assert!(!expr.contains("NEW."));
        assert!(expr.contains("coalesce(message, '')"));
    }
}
