//! Log entry repository: ingest, point reads, filtered listing, and
//! trace reconstruction.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{Pool, Postgres, Row, Transaction};
use uuid::Uuid;

use logr_core::{
    defaults, BatchResponse, CreateLogRequest, Error, ListLogsRequest, ListLogsResponse, LogEntry,
    LogEvent, LogLevel, LogTraceResponse, Result,
};

use crate::escape_like;

/// Columns fetched for every log entry read. The embedding vector is
/// intentionally excluded from read paths; responses carry only
/// `embedding_model` as the indicator that a row has been embedded.
const LOG_COLUMNS: &str = "id, service, environment, host, version, level, message, context, \
     trace_id, span_id, parent_span_id, request_id, user_id, session_id, \
     timestamp, duration_ms, model, tokens_in, tokens_out, cost_usd, \
     error_type, error_message, stack_trace, embedding_model, created_at";

/// Dynamic query parameter for filter building.
enum QueryParam {
    Str(String),
    Ts(DateTime<Utc>),
    F64(f64),
}

/// PostgreSQL implementation of the log entry repository.
pub struct PgLogRepository {
    pool: Pool<Postgres>,
}

impl PgLogRepository {
    /// Create a new PgLogRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Validate and persist a single entry with its events atomically.
    ///
    /// Nothing is persisted when validation fails.
    pub async fn insert(&self, req: &CreateLogRequest) -> Result<LogEntry> {
        let level = req.validate()?;

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let entry = insert_tx(&mut tx, req, level).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(entry)
    }

    /// Persist a batch of entries. Each item is validated
    /// independently; failures are counted and reported but never
    /// abort the batch. All accepted items commit in one transaction.
    pub async fn insert_batch(&self, reqs: &[CreateLogRequest]) -> Result<BatchResponse> {
        let mut accepted = 0usize;
        let mut errors = Vec::new();

        let mut valid = Vec::with_capacity(reqs.len());
        for (i, req) in reqs.iter().enumerate() {
            match req.validate() {
                Ok(level) => valid.push((req, level)),
                Err(e) => errors.push(format!("log {i}: {e}")),
            }
        }

        if !valid.is_empty() {
            let mut tx = self.pool.begin().await.map_err(Error::Database)?;
            for (req, level) in valid {
                insert_tx(&mut tx, req, level).await?;
                accepted += 1;
            }
            tx.commit().await.map_err(Error::Database)?;
        }

        let failed = errors.len();
        errors.truncate(defaults::BATCH_MAX_ERRORS);
        Ok(BatchResponse {
            accepted,
            failed,
            errors,
        })
    }

    /// Fetch one entry with its events.
    pub async fn fetch(&self, id: Uuid) -> Result<LogEntry> {
        let sql = format!("SELECT {LOG_COLUMNS} FROM log_entries WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?
            .ok_or(Error::LogNotFound(id))?;

        let mut entry = map_log_row(row)?;
        entry.events = self
            .events_for(&[id])
            .await?
            .remove(&id)
            .unwrap_or_default();
        Ok(entry)
    }

    /// Filtered list, timestamp-descending, paginated.
    pub async fn list(&self, req: &ListLogsRequest) -> Result<ListLogsResponse> {
        let (where_clause, params) = build_filters(req);

        let count_sql = format!("SELECT COUNT(*) FROM log_entries {where_clause}");
        let total: i64 = bind_params(sqlx::query_scalar(&count_sql), &params)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;

        let offset = (req.page - 1) * req.page_size;
        let list_sql = format!(
            "SELECT {LOG_COLUMNS} FROM log_entries {where_clause} \
             ORDER BY timestamp DESC OFFSET ${} LIMIT ${}",
            params.len() + 1,
            params.len() + 2
        );

        let rows = bind_query_params(sqlx::query(&list_sql), &params)
            .bind(offset)
            .bind(req.page_size)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        let logs = rows
            .into_iter()
            .map(map_log_row)
            .collect::<Result<Vec<_>>>()?;

        let has_more = (offset + logs.len() as i64) < total;
        Ok(ListLogsResponse {
            logs,
            total,
            page: req.page,
            page_size: req.page_size,
            has_more,
        })
    }

    /// All entries of a trace (with events) plus derived trace facts.
    pub async fn trace(&self, trace_id: &str) -> Result<LogTraceResponse> {
        let sql = format!(
            "SELECT {LOG_COLUMNS} FROM log_entries WHERE trace_id = $1 ORDER BY timestamp ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(trace_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        if rows.is_empty() {
            return Err(Error::NotFound(format!("trace {trace_id}")));
        }

        let mut logs = rows
            .into_iter()
            .map(map_log_row)
            .collect::<Result<Vec<_>>>()?;

        let ids: Vec<Uuid> = logs.iter().map(|l| l.id).collect();
        let mut events = self.events_for(&ids).await?;
        for log in &mut logs {
            log.events = events.remove(&log.id).unwrap_or_default();
        }

        let mut services: Vec<String> = Vec::new();
        for log in &logs {
            if !services.contains(&log.service) {
                services.push(log.service.clone());
            }
        }

        let span_count = logs
            .iter()
            .filter_map(|l| l.span_id.as_deref())
            .collect::<std::collections::HashSet<_>>()
            .len() as i64;

        let start_time = logs.iter().map(|l| l.timestamp).min();
        let end_time = logs.iter().map(|l| l.timestamp).max();
        let total_duration_ms = logs.iter().filter_map(|l| l.duration_ms).sum();

        Ok(LogTraceResponse {
            trace_id: trace_id.to_string(),
            logs,
            services,
            span_count,
            start_time,
            end_time,
            total_duration_ms,
        })
    }

    /// Distinct services that have submitted logs, sorted.
    pub async fn services(&self) -> Result<Vec<String>> {
        let rows: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT service FROM log_entries ORDER BY service")
                .fetch_all(&self.pool)
                .await
                .map_err(Error::Database)?;
        Ok(rows)
    }

    /// Distinct non-null models seen in logs, sorted.
    pub async fn models(&self) -> Result<Vec<String>> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT model FROM log_entries WHERE model IS NOT NULL ORDER BY model",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(rows)
    }

    /// Load events for a set of entries, keyed by parent id, in
    /// sequence order.
    async fn events_for(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<LogEvent>>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query(
            "SELECT id, log_entry_id, event_type, content, content_type, event_metadata, \
                    sequence, duration_ms, created_at \
             FROM log_events WHERE log_entry_id = ANY($1) \
             ORDER BY sequence ASC, created_at ASC",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let mut by_entry: HashMap<Uuid, Vec<LogEvent>> = HashMap::new();
        for row in rows {
            let event = map_event_row(row)?;
            by_entry.entry(event.log_entry_id).or_default().push(event);
        }
        Ok(by_entry)
    }
}

/// Insert one validated entry plus its events inside a transaction.
async fn insert_tx(
    tx: &mut Transaction<'_, Postgres>,
    req: &CreateLogRequest,
    level: LogLevel,
) -> Result<LogEntry> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    let timestamp = req.timestamp.unwrap_or(now);
    let context = match &req.context {
        JsonValue::Null => serde_json::json!({}),
        other => other.clone(),
    };

    sqlx::query(
        r#"
        INSERT INTO log_entries (
            id, service, environment, host, version, level, message, context,
            trace_id, span_id, parent_span_id, request_id, user_id, session_id,
            timestamp, duration_ms, model, tokens_in, tokens_out, cost_usd,
            error_type, error_message, stack_trace, created_at
        ) VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8,
            $9, $10, $11, $12, $13, $14,
            $15, $16, $17, $18, $19, $20,
            $21, $22, $23, $24
        )
        "#,
    )
    .bind(id)
    .bind(&req.service)
    .bind(&req.environment)
    .bind(&req.host)
    .bind(&req.version)
    .bind(level.as_str())
    .bind(&req.message)
    .bind(&context)
    .bind(&req.trace_id)
    .bind(&req.span_id)
    .bind(&req.parent_span_id)
    .bind(&req.request_id)
    .bind(&req.user_id)
    .bind(&req.session_id)
    .bind(timestamp)
    .bind(req.duration_ms)
    .bind(&req.model)
    .bind(req.tokens_in)
    .bind(req.tokens_out)
    .bind(req.cost_usd)
    .bind(&req.error_type)
    .bind(&req.error_message)
    .bind(&req.stack_trace)
    .bind(now)
    .execute(&mut **tx)
    .await
    .map_err(Error::Database)?;

    let mut events = Vec::with_capacity(req.events.len());
    for event_req in &req.events {
        let event_type = event_req.validate()?;
        let event_id = Uuid::new_v4();
        let metadata = match &event_req.metadata {
            JsonValue::Null => serde_json::json!({}),
            other => other.clone(),
        };

        sqlx::query(
            r#"
            INSERT INTO log_events (
                id, log_entry_id, event_type, content, content_type,
                event_metadata, sequence, duration_ms, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(event_id)
        .bind(id)
        .bind(event_type.as_str())
        .bind(&event_req.content)
        .bind(&event_req.content_type)
        .bind(&metadata)
        .bind(event_req.sequence)
        .bind(event_req.duration_ms)
        .bind(now)
        .execute(&mut **tx)
        .await
        .map_err(Error::Database)?;

        events.push(LogEvent {
            id: event_id,
            log_entry_id: id,
            event_type,
            content: event_req.content.clone(),
            content_type: event_req.content_type.clone(),
            metadata,
            sequence: event_req.sequence,
            duration_ms: event_req.duration_ms,
            created_at: now,
        });
    }
    events.sort_by_key(|e| e.sequence);

    Ok(LogEntry {
        id,
        service: req.service.clone(),
        environment: req.environment.clone(),
        host: req.host.clone(),
        version: req.version.clone(),
        level,
        message: req.message.clone(),
        context,
        trace_id: req.trace_id.clone(),
        span_id: req.span_id.clone(),
        parent_span_id: req.parent_span_id.clone(),
        request_id: req.request_id.clone(),
        user_id: req.user_id.clone(),
        session_id: req.session_id.clone(),
        timestamp,
        duration_ms: req.duration_ms,
        model: req.model.clone(),
        tokens_in: req.tokens_in,
        tokens_out: req.tokens_out,
        cost_usd: req.cost_usd,
        error_type: req.error_type.clone(),
        error_message: req.error_message.clone(),
        stack_trace: req.stack_trace.clone(),
        embedding_model: None,
        created_at: now,
        events,
    })
}

/// Build the WHERE clause and parameter list for a list request.
///
/// Predicates are conjoined; placeholder numbering follows the
/// parameter vector so callers can append OFFSET/LIMIT after.
fn build_filters(req: &ListLogsRequest) -> (String, Vec<QueryParam>) {
    let mut conditions: Vec<String> = Vec::new();
    let mut params: Vec<QueryParam> = Vec::new();

    let push_str = |conditions: &mut Vec<String>, params: &mut Vec<QueryParam>, column: &str, value: String| {
        params.push(QueryParam::Str(value));
        conditions.push(format!("{column} = ${}", params.len()));
    };

    if let Some(service) = &req.service {
        push_str(&mut conditions, &mut params, "service", service.clone());
    }
    if let Some(level) = req.level {
        push_str(&mut conditions, &mut params, "level", level.as_str().to_string());
    }
    if let Some(environment) = &req.environment {
        push_str(&mut conditions, &mut params, "environment", environment.clone());
    }
    if let Some(trace_id) = &req.trace_id {
        push_str(&mut conditions, &mut params, "trace_id", trace_id.clone());
    }
    if let Some(span_id) = &req.span_id {
        push_str(&mut conditions, &mut params, "span_id", span_id.clone());
    }
    if let Some(request_id) = &req.request_id {
        push_str(&mut conditions, &mut params, "request_id", request_id.clone());
    }
    if let Some(user_id) = &req.user_id {
        push_str(&mut conditions, &mut params, "user_id", user_id.clone());
    }
    if let Some(session_id) = &req.session_id {
        push_str(&mut conditions, &mut params, "session_id", session_id.clone());
    }
    if let Some(model) = &req.model {
        push_str(&mut conditions, &mut params, "model", model.clone());
    }
    if let Some(error_type) = &req.error_type {
        push_str(&mut conditions, &mut params, "error_type", error_type.clone());
    }

    match req.has_error {
        Some(true) => conditions.push("error_type IS NOT NULL".to_string()),
        Some(false) => conditions.push("error_type IS NULL".to_string()),
        None => {}
    }

    if let Some(since) = req.since {
        params.push(QueryParam::Ts(since));
        conditions.push(format!("timestamp >= ${}", params.len()));
    }
    if let Some(until) = req.until {
        params.push(QueryParam::Ts(until));
        conditions.push(format!("timestamp <= ${}", params.len()));
    }
    if let Some(min) = req.min_duration_ms {
        params.push(QueryParam::F64(min));
        conditions.push(format!("duration_ms >= ${}", params.len()));
    }
    if let Some(max) = req.max_duration_ms {
        params.push(QueryParam::F64(max));
        conditions.push(format!("duration_ms <= ${}", params.len()));
    }
    if let Some(search) = &req.search {
        params.push(QueryParam::Str(format!("%{}%", escape_like(search))));
        conditions.push(format!("message ILIKE ${}", params.len()));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };
    (where_clause, params)
}

fn bind_query_params<'q>(
    mut q: sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>,
    params: &[QueryParam],
) -> sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments> {
    for param in params {
        q = match param {
            QueryParam::Str(s) => q.bind(s.clone()),
            QueryParam::Ts(ts) => q.bind(*ts),
            QueryParam::F64(f) => q.bind(*f),
        };
    }
    q
}

fn bind_params<'q, O>(
    mut q: sqlx::query::QueryScalar<'q, Postgres, O, sqlx::postgres::PgArguments>,
    params: &[QueryParam],
) -> sqlx::query::QueryScalar<'q, Postgres, O, sqlx::postgres::PgArguments> {
    for param in params {
        q = match param {
            QueryParam::Str(s) => q.bind(s.clone()),
            QueryParam::Ts(ts) => q.bind(*ts),
            QueryParam::F64(f) => q.bind(*f),
        };
    }
    q
}

/// Map a database row to a LogEntry (events left empty).
fn map_log_row(row: sqlx::postgres::PgRow) -> Result<LogEntry> {
    let level: LogLevel = row.get::<String, _>("level").parse()?;

    Ok(LogEntry {
        id: row.get("id"),
        service: row.get("service"),
        environment: row.get("environment"),
        host: row.get("host"),
        version: row.get("version"),
        level,
        message: row.get("message"),
        context: row.get("context"),
        trace_id: row.get("trace_id"),
        span_id: row.get("span_id"),
        parent_span_id: row.get("parent_span_id"),
        request_id: row.get("request_id"),
        user_id: row.get("user_id"),
        session_id: row.get("session_id"),
        timestamp: row.get("timestamp"),
        duration_ms: row.get("duration_ms"),
        model: row.get("model"),
        tokens_in: row.get("tokens_in"),
        tokens_out: row.get("tokens_out"),
        cost_usd: row.get("cost_usd"),
        error_type: row.get("error_type"),
        error_message: row.get("error_message"),
        stack_trace: row.get("stack_trace"),
        embedding_model: row.get("embedding_model"),
        created_at: row.get("created_at"),
        events: Vec::new(),
    })
}

fn map_event_row(row: sqlx::postgres::PgRow) -> Result<LogEvent> {
    let event_type: logr_core::EventType = row.get::<String, _>("event_type").parse()?;

    Ok(LogEvent {
        id: row.get("id"),
        log_entry_id: row.get("log_entry_id"),
        event_type,
        content: row.get("content"),
        content_type: row.get("content_type"),
        metadata: row.get("event_metadata"),
        sequence: row.get("sequence"),
        duration_ms: row.get("duration_ms"),
        created_at: row.get("created_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_request() -> ListLogsRequest {
        ListLogsRequest {
            page: 1,
            page_size: 50,
            ..Default::default()
        }
    }

    #[test]
    fn test_build_filters_empty() {
        let (clause, params) = build_filters(&list_request());
        assert_eq!(clause, "");
        assert!(params.is_empty());
    }

    #[test]
    fn test_build_filters_conjunction() {
        let req = ListLogsRequest {
            service: Some("taskr-bot".into()),
            level: Some(LogLevel::Error),
            has_error: Some(true),
            ..list_request()
        };
        let (clause, params) = build_filters(&req);
        assert_eq!(
            clause,
            "WHERE service = $1 AND level = $2 AND error_type IS NOT NULL"
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_build_filters_search_escapes_like() {
        let req = ListLogsRequest {
            search: Some("100%_done".into()),
            ..list_request()
        };
        let (clause, params) = build_filters(&req);
        assert!(clause.contains("message ILIKE $1"));
        match &params[0] {
            QueryParam::Str(s) => assert_eq!(s, "%100\\%\\_done%"),
            _ => panic!("expected string param"),
        }
    }

    #[test]
    fn test_build_filters_placeholder_numbering() {
        let req = ListLogsRequest {
            service: Some("a".into()),
            since: Some(Utc::now()),
            min_duration_ms: Some(10.0),
            search: Some("x".into()),
            ..list_request()
        };
        let (clause, params) = build_filters(&req);
        assert_eq!(params.len(), 4);
        assert!(clause.contains("timestamp >= $2"));
        assert!(clause.contains("duration_ms >= $3"));
        assert!(clause.contains("message ILIKE $4"));
    }
}
