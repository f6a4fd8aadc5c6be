//! Distributed-tracing span endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use logr_core::{
    defaults, BatchResponse, CreateSpanRequest, ListSpansRequest, Span, SpanBatchRequest,
    SpanStatus, SpanTraceResponse,
};

use crate::auth::AuthKey;
use crate::error::{ApiError, ApiJson};
use crate::AppState;

/// `POST /v1/spans`: create one span, 201.
pub async fn create_span(
    State(state): State<AppState>,
    auth: AuthKey,
    ApiJson(req): ApiJson<CreateSpanRequest>,
) -> Result<(StatusCode, Json<Span>), ApiError> {
    auth.require_write()?;
    let span = state.db.spans.insert(&req).await?;
    Ok((StatusCode::CREATED, Json(span)))
}

/// `POST /v1/spans/batch`: up to 1000 spans, partial success, 201.
pub async fn create_spans_batch(
    State(state): State<AppState>,
    auth: AuthKey,
    ApiJson(batch): ApiJson<SpanBatchRequest>,
) -> Result<(StatusCode, Json<BatchResponse>), ApiError> {
    auth.require_write()?;
    if batch.spans.len() > defaults::BATCH_MAX_ITEMS {
        return Err(ApiError::validation(format!(
            "batch too large. Maximum spans: {}",
            defaults::BATCH_MAX_ITEMS
        )));
    }
    let response = state.db.spans.insert_batch(&batch.spans).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Query parameters for `GET /v1/spans`.
#[derive(Debug, Deserialize)]
pub struct SpansQuery {
    pub service: Option<String>,
    pub trace_id: Option<String>,
    pub operation: Option<String>,
    pub status: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

/// `GET /v1/spans`: filtered span list, start-time descending.
pub async fn list_spans(
    State(state): State<AppState>,
    auth: AuthKey,
    Query(query): Query<SpansQuery>,
) -> Result<Json<Vec<Span>>, ApiError> {
    auth.require_read()?;

    let status = match &query.status {
        Some(raw) => Some(raw.parse::<SpanStatus>()?),
        None => None,
    };
    let limit = query.limit.unwrap_or(defaults::SPAN_LIST_LIMIT);
    if !(1..=1000).contains(&limit) {
        return Err(ApiError::validation("limit must be between 1 and 1000"));
    }

    let req = ListSpansRequest {
        service: query.service,
        trace_id: query.trace_id,
        operation: query.operation,
        status,
        since: query.since,
        until: query.until,
        limit,
    };
    Ok(Json(state.db.spans.list(&req).await?))
}

/// `GET /v1/spans/trace/{trace_id}`: spans plus the reconstructed
/// parent→children tree; 404 when the trace has no spans.
pub async fn get_span_trace(
    State(state): State<AppState>,
    auth: AuthKey,
    Path(trace_id): Path<String>,
) -> Result<Json<SpanTraceResponse>, ApiError> {
    auth.require_read()?;
    Ok(Json(state.db.spans.trace(&trace_id).await?))
}
