//! Span repository and trace tree reconstruction.

use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::{Pool, Postgres, Row, Transaction};
use uuid::Uuid;

use logr_core::{
    defaults, BatchResponse, CreateSpanRequest, Error, ListSpansRequest, Result, Span, SpanKind,
    SpanNode, SpanStatus, SpanTraceResponse,
};

const SPAN_COLUMNS: &str = "id, trace_id, span_id, parent_span_id, service, operation, kind, \
     start_time, end_time, duration_ms, status, status_message, attributes, resource, created_at";

/// PostgreSQL implementation of the span repository.
pub struct PgSpanRepository {
    pool: Pool<Postgres>,
}

impl PgSpanRepository {
    /// Create a new PgSpanRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Validate and persist a single span.
    ///
    /// A duplicate `(trace_id, span_id)` pair surfaces as a validation
    /// error rather than a database error.
    pub async fn insert(&self, req: &CreateSpanRequest) -> Result<Span> {
        let (kind, status) = req.validate()?;

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let span = insert_tx(&mut tx, req, kind, status).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(span)
    }

    /// Persist a batch of spans; same partial-success contract as log
    /// batches. Duplicate span ids inside the batch fail item-wise.
    pub async fn insert_batch(&self, reqs: &[CreateSpanRequest]) -> Result<BatchResponse> {
        let mut accepted = 0usize;
        let mut errors = Vec::new();

        let mut valid = Vec::with_capacity(reqs.len());
        for (i, req) in reqs.iter().enumerate() {
            match req.validate() {
                Ok(parsed) => valid.push((i, req, parsed)),
                Err(e) => errors.push(format!("span {i}: {e}")),
            }
        }

        if !valid.is_empty() {
            let mut tx = self.pool.begin().await.map_err(Error::Database)?;
            for (i, req, (kind, status)) in valid {
                match insert_tx(&mut tx, req, kind, status).await {
                    Ok(_) => accepted += 1,
                    Err(Error::Validation(msg)) => errors.push(format!("span {i}: {msg}")),
                    Err(e) => return Err(e),
                }
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

    /// Filtered span listing, start-time descending.
    pub async fn list(&self, req: &ListSpansRequest) -> Result<Vec<Span>> {
        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<String> = Vec::new();

        if let Some(service) = &req.service {
            params.push(service.clone());
            conditions.push(format!("service = ${}", params.len()));
        }
        if let Some(trace_id) = &req.trace_id {
            params.push(trace_id.clone());
            conditions.push(format!("trace_id = ${}", params.len()));
        }
        if let Some(operation) = &req.operation {
            params.push(operation.clone());
            conditions.push(format!("operation = ${}", params.len()));
        }
        if let Some(status) = req.status {
            params.push(status.as_str().to_string());
            conditions.push(format!("status = ${}", params.len()));
        }

        let mut sql = format!("SELECT {SPAN_COLUMNS} FROM spans");
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        // Time bounds bind after the string params so the placeholder
        // numbering stays contiguous.
        let mut next = params.len() + 1;
        if req.since.is_some() {
            sql.push_str(if conditions.is_empty() { " WHERE " } else { " AND " });
            sql.push_str(&format!("start_time >= ${next}"));
            next += 1;
        }
        if req.until.is_some() {
            sql.push_str(if sql.contains("WHERE") { " AND " } else { " WHERE " });
            sql.push_str(&format!("start_time <= ${next}"));
            next += 1;
        }
        sql.push_str(&format!(" ORDER BY start_time DESC LIMIT ${next}"));

        let mut q = sqlx::query(&sql);
        for param in &params {
            q = q.bind(param.clone());
        }
        if let Some(since) = req.since {
            q = q.bind(since);
        }
        if let Some(until) = req.until {
            q = q.bind(until);
        }
        q = q.bind(req.limit);

        let rows = q.fetch_all(&self.pool).await.map_err(Error::Database)?;
        rows.into_iter().map(map_span_row).collect()
    }

    /// All spans of a trace plus the reconstructed parent→children
    /// tree and derived facts.
    pub async fn trace(&self, trace_id: &str) -> Result<SpanTraceResponse> {
        let sql = format!(
            "SELECT {SPAN_COLUMNS} FROM spans WHERE trace_id = $1 ORDER BY start_time ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(trace_id)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        if rows.is_empty() {
            return Err(Error::NotFound(format!("trace {trace_id}")));
        }

        let spans = rows
            .into_iter()
            .map(map_span_row)
            .collect::<Result<Vec<_>>>()?;

        let tree = build_span_tree(&spans);

        let mut services: Vec<String> = Vec::new();
        for span in &spans {
            if !services.contains(&span.service) {
                services.push(span.service.clone());
            }
        }

        let start_time = spans.iter().map(|s| s.start_time).min();
        let end_time = spans.iter().filter_map(|s| s.end_time).max();

        Ok(SpanTraceResponse {
            trace_id: trace_id.to_string(),
            spans,
            tree,
            services,
            start_time,
            end_time,
        })
    }
}

async fn insert_tx(
    tx: &mut Transaction<'_, Postgres>,
    req: &CreateSpanRequest,
    kind: SpanKind,
    status: SpanStatus,
) -> Result<Span> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    let attributes = match &req.attributes {
        JsonValue::Null => serde_json::json!({}),
        other => other.clone(),
    };
    let resource = match &req.resource {
        JsonValue::Null => serde_json::json!({}),
        other => other.clone(),
    };

    // ON CONFLICT DO NOTHING instead of surfacing the unique violation:
    // an error inside the batch transaction would abort it and take the
    // valid items down with the duplicate.
    let result = sqlx::query(
        r#"
        INSERT INTO spans (
            id, trace_id, span_id, parent_span_id, service, operation, kind,
            start_time, end_time, duration_ms, status, status_message,
            attributes, resource, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        ON CONFLICT (trace_id, span_id) DO NOTHING
        "#,
    )
    .bind(id)
    .bind(&req.trace_id)
    .bind(&req.span_id)
    .bind(&req.parent_span_id)
    .bind(&req.service)
    .bind(&req.operation)
    .bind(kind.as_str())
    .bind(req.start_time)
    .bind(req.end_time)
    .bind(req.duration_ms)
    .bind(status.as_str())
    .bind(&req.status_message)
    .bind(&attributes)
    .bind(&resource)
    .bind(now)
    .execute(&mut **tx)
    .await
    .map_err(Error::Database)?;

    if result.rows_affected() == 0 {
        return Err(Error::Validation(format!(
            "span {} already exists in trace {}",
            req.span_id, req.trace_id
        )));
    }

    Ok(Span {
        id,
        trace_id: req.trace_id.clone(),
        span_id: req.span_id.clone(),
        parent_span_id: req.parent_span_id.clone(),
        service: req.service.clone(),
        operation: req.operation.clone(),
        kind,
        start_time: req.start_time,
        end_time: req.end_time,
        duration_ms: req.duration_ms,
        status,
        status_message: req.status_message.clone(),
        attributes,
        resource,
        created_at: now,
    })
}

/// Build the parent→children tree for one trace.
///
/// A span is a root when its `parent_span_id` is null or names a span
/// absent from the trace (orphans become roots rather than vanishing).
/// Children keep the input (start_time) order.
pub fn build_span_tree(spans: &[Span]) -> Vec<SpanNode> {
    let known: std::collections::HashSet<&str> =
        spans.iter().map(|s| s.span_id.as_str()).collect();

    let mut children_of: std::collections::HashMap<&str, Vec<&Span>> =
        std::collections::HashMap::new();
    let mut roots: Vec<&Span> = Vec::new();

    for span in spans {
        match span.parent_span_id.as_deref() {
            Some(parent) if known.contains(parent) => {
                children_of.entry(parent).or_default().push(span);
            }
            _ => roots.push(span),
        }
    }

    fn attach(
        span: &Span,
        children_of: &std::collections::HashMap<&str, Vec<&Span>>,
    ) -> SpanNode {
        let children = children_of
            .get(span.span_id.as_str())
            .map(|kids| kids.iter().map(|k| attach(k, children_of)).collect())
            .unwrap_or_default();
        SpanNode {
            span: span.clone(),
            children,
        }
    }

    roots.into_iter().map(|r| attach(r, &children_of)).collect()
}

fn map_span_row(row: sqlx::postgres::PgRow) -> Result<Span> {
    let kind: SpanKind = row.get::<String, _>("kind").parse()?;
    let status: SpanStatus = row.get::<String, _>("status").parse()?;

    Ok(Span {
        id: row.get("id"),
        trace_id: row.get("trace_id"),
        span_id: row.get("span_id"),
        parent_span_id: row.get("parent_span_id"),
        service: row.get("service"),
        operation: row.get("operation"),
        kind,
        start_time: row.get("start_time"),
        end_time: row.get("end_time"),
        duration_ms: row.get("duration_ms"),
        status,
        status_message: row.get("status_message"),
        attributes: row.get("attributes"),
        resource: row.get("resource"),
        created_at: row.get("created_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn span(span_id: &str, parent: Option<&str>, offset_ms: i64) -> Span {
        let start = Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0).unwrap()
            + chrono::Duration::milliseconds(offset_ms);
        Span {
            id: Uuid::new_v4(),
            trace_id: "trace-1".into(),
            span_id: span_id.into(),
            parent_span_id: parent.map(String::from),
            service: "taskr-bot".into(),
            operation: "op".into(),
            kind: SpanKind::Internal,
            start_time: start,
            end_time: None,
            duration_ms: None,
            status: SpanStatus::Unset,
            status_message: None,
            attributes: serde_json::json!({}),
            resource: serde_json::json!({}),
            created_at: start,
        }
    }

    #[test]
    fn test_tree_single_root() {
        let spans = vec![
            span("root", None, 0),
            span("child-a", Some("root"), 10),
            span("child-b", Some("root"), 20),
            span("grandchild", Some("child-a"), 30),
        ];

        let tree = build_span_tree(&spans);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].span.span_id, "root");
        assert_eq!(tree[0].children.len(), 2);
        assert_eq!(tree[0].children[0].span.span_id, "child-a");
        assert_eq!(tree[0].children[0].children.len(), 1);
        assert_eq!(tree[0].children[0].children[0].span.span_id, "grandchild");
    }

    #[test]
    fn test_tree_orphan_parent_becomes_root() {
        let spans = vec![
            span("root", None, 0),
            span("orphan", Some("missing"), 10),
        ];

        let tree = build_span_tree(&spans);
        assert_eq!(tree.len(), 2);
        let ids: Vec<&str> = tree.iter().map(|n| n.span.span_id.as_str()).collect();
        assert!(ids.contains(&"root"));
        assert!(ids.contains(&"orphan"));
    }

    #[test]
    fn test_tree_children_keep_start_order() {
        let spans = vec![
            span("root", None, 0),
            span("first", Some("root"), 1),
            span("second", Some("root"), 2),
            span("third", Some("root"), 3),
        ];

        let tree = build_span_tree(&spans);
        let order: Vec<&str> = tree[0]
            .children
            .iter()
            .map(|n| n.span.span_id.as_str())
            .collect();
        assert_eq!(order, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_tree_empty() {
        assert!(build_span_tree(&[]).is_empty());
    }

    #[test]
    fn test_every_nonroot_has_its_parent_as_ancestor() {
        let spans = vec![
            span("r", None, 0),
            span("a", Some("r"), 1),
            span("b", Some("a"), 2),
            span("c", Some("b"), 3),
        ];
        let tree = build_span_tree(&spans);
        assert_eq!(tree.len(), 1);

        fn depth(node: &SpanNode) -> usize {
            1 + node.children.iter().map(depth).max().unwrap_or(0)
        }
        assert_eq!(depth(&tree[0]), 4);
    }
}
