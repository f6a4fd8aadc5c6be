//! Log ingestion and query endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use logr_core::{
    defaults, BatchResponse, CreateLogRequest, ListLogsRequest, ListLogsResponse, LogBatchRequest,
    LogEntry, LogLevel, LogStats, LogTraceResponse,
};

use crate::auth::AuthKey;
use crate::error::{ApiError, ApiJson};
use crate::AppState;

/// Query parameters for `GET /v1/logs`.
#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub service: Option<String>,
    pub level: Option<String>,
    pub environment: Option<String>,
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    pub request_id: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub model: Option<String>,
    pub error_type: Option<String>,
    pub has_error: Option<bool>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub min_duration_ms: Option<f64>,
    pub max_duration_ms: Option<f64>,
    pub search: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl LogsQuery {
    fn into_list_request(self) -> Result<ListLogsRequest, ApiError> {
        let level = match &self.level {
            Some(raw) => Some(raw.parse::<LogLevel>()?),
            None => None,
        };

        let page = self.page.unwrap_or(1);
        if page < 1 {
            return Err(ApiError::validation("page must be >= 1"));
        }
        let page_size = self.page_size.unwrap_or(defaults::PAGE_SIZE);
        if !(1..=defaults::PAGE_SIZE_MAX).contains(&page_size) {
            return Err(ApiError::validation(format!(
                "page_size must be between 1 and {}",
                defaults::PAGE_SIZE_MAX
            )));
        }

        Ok(ListLogsRequest {
            service: self.service,
            level,
            environment: self.environment,
            trace_id: self.trace_id,
            span_id: self.span_id,
            request_id: self.request_id,
            user_id: self.user_id,
            session_id: self.session_id,
            model: self.model,
            error_type: self.error_type,
            has_error: self.has_error,
            since: self.since,
            until: self.until,
            min_duration_ms: self.min_duration_ms,
            max_duration_ms: self.max_duration_ms,
            search: self.search,
            page,
            page_size,
        })
    }
}

/// `POST /v1/logs`: create one entry with its events, 201.
pub async fn create_log(
    State(state): State<AppState>,
    auth: AuthKey,
    ApiJson(req): ApiJson<CreateLogRequest>,
) -> Result<(StatusCode, Json<LogEntry>), ApiError> {
    auth.require_write()?;
    let entry = state.db.logs.insert(&req).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// `POST /v1/logs/batch`: up to 1000 entries, partial success, 201.
pub async fn create_logs_batch(
    State(state): State<AppState>,
    auth: AuthKey,
    ApiJson(batch): ApiJson<LogBatchRequest>,
) -> Result<(StatusCode, Json<BatchResponse>), ApiError> {
    auth.require_write()?;
    if batch.logs.len() > defaults::BATCH_MAX_ITEMS {
        return Err(ApiError::validation(format!(
            "batch too large. Maximum entries: {}",
            defaults::BATCH_MAX_ITEMS
        )));
    }
    let response = state.db.logs.insert_batch(&batch.logs).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// `GET /v1/logs`: filtered list, timestamp descending, paginated.
pub async fn list_logs(
    State(state): State<AppState>,
    auth: AuthKey,
    Query(query): Query<LogsQuery>,
) -> Result<Json<ListLogsResponse>, ApiError> {
    auth.require_read()?;
    let req = query.into_list_request()?;
    Ok(Json(state.db.logs.list(&req).await?))
}

/// `GET /v1/logs/services`: distinct services.
pub async fn list_services(
    State(state): State<AppState>,
    auth: AuthKey,
) -> Result<Json<Vec<String>>, ApiError> {
    auth.require_read()?;
    Ok(Json(state.db.logs.services().await?))
}

/// `GET /v1/logs/models`: distinct non-null models.
pub async fn list_models(
    State(state): State<AppState>,
    auth: AuthKey,
) -> Result<Json<Vec<String>>, ApiError> {
    auth.require_read()?;
    Ok(Json(state.db.logs.models().await?))
}

/// Query parameters for `GET /v1/logs/stats`.
#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub service: Option<String>,
    pub hours: Option<i64>,
}

/// `GET /v1/logs/stats`: time-windowed aggregations.
pub async fn get_stats(
    State(state): State<AppState>,
    auth: AuthKey,
    Query(query): Query<StatsQuery>,
) -> Result<Json<LogStats>, ApiError> {
    auth.require_read()?;
    let hours = validate_hours(query.hours)?;
    let stats = state.db.stats.stats(query.service.as_deref(), hours).await?;
    Ok(Json(stats))
}

/// `GET /v1/logs/trace/{trace_id}`: trace reconstruction; 404 when
/// the trace has no entries.
pub async fn get_log_trace(
    State(state): State<AppState>,
    auth: AuthKey,
    Path(trace_id): Path<String>,
) -> Result<Json<LogTraceResponse>, ApiError> {
    auth.require_read()?;
    Ok(Json(state.db.logs.trace(&trace_id).await?))
}

/// `GET /v1/logs/{id}`: single entry with events; 404 if absent.
pub async fn get_log(
    State(state): State<AppState>,
    auth: AuthKey,
    Path(id): Path<Uuid>,
) -> Result<Json<LogEntry>, ApiError> {
    auth.require_read()?;
    Ok(Json(state.db.logs.fetch(id).await?))
}

/// Clamp-validate a stats/anomaly window to 1..=168 hours.
pub fn validate_hours(hours: Option<i64>) -> Result<i64, ApiError> {
    let hours = hours.unwrap_or(defaults::STATS_DEFAULT_HOURS);
    if !(1..=defaults::STATS_MAX_HOURS).contains(&hours) {
        return Err(ApiError::validation(format!(
            "hours must be between 1 and {}",
            defaults::STATS_MAX_HOURS
        )));
    }
    Ok(hours)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_query() -> LogsQuery {
        LogsQuery {
            service: None,
            level: None,
            environment: None,
            trace_id: None,
            span_id: None,
            request_id: None,
            user_id: None,
            session_id: None,
            model: None,
            error_type: None,
            has_error: None,
            since: None,
            until: None,
            min_duration_ms: None,
            max_duration_ms: None,
            search: None,
            page: None,
            page_size: None,
        }
    }

    #[test]
    fn test_query_defaults() {
        let req = empty_query().into_list_request().unwrap();
        assert_eq!(req.page, 1);
        assert_eq!(req.page_size, 50);
    }

    #[test]
    fn test_query_level_normalized() {
        let mut query = empty_query();
        query.level = Some("WARNING".into());
        let req = query.into_list_request().unwrap();
        assert_eq!(req.level, Some(LogLevel::Warn));
    }

    #[test]
    fn test_query_rejects_bad_level() {
        let mut query = empty_query();
        query.level = Some("loud".into());
        assert!(query.into_list_request().is_err());
    }

    #[test]
    fn test_query_rejects_bad_pagination() {
        let mut query = empty_query();
        query.page = Some(0);
        assert!(query.into_list_request().is_err());

        let mut query = empty_query();
        query.page_size = Some(501);
        assert!(query.into_list_request().is_err());

        let mut query = empty_query();
        query.page_size = Some(0);
        assert!(query.into_list_request().is_err());
    }

    #[test]
    fn test_validate_hours() {
        assert_eq!(validate_hours(None).unwrap(), 24);
        assert_eq!(validate_hours(Some(168)).unwrap(), 168);
        assert!(validate_hours(Some(0)).is_err());
        assert!(validate_hours(Some(169)).is_err());
    }
}
