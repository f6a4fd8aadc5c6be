//! Semantic search, similar-log, error grouping, and anomaly endpoints.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use logr_core::{AnomalyFinding, ErrorGroup, SearchRequest, SearchResponse, SimilarRequest};

use crate::auth::AuthKey;
use crate::error::{ApiError, ApiJson};
use crate::handlers::logs::validate_hours;
use crate::AppState;

/// `POST /v1/search/semantic`: ensemble/vector/bm25/text search.
pub async fn semantic_search(
    State(state): State<AppState>,
    auth: AuthKey,
    ApiJson(req): ApiJson<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    auth.require_read()?;
    Ok(Json(state.engine.search(&req).await?))
}

/// `POST /v1/search/similar`: similar-log retrieval by reference id.
pub async fn similar_search(
    State(state): State<AppState>,
    auth: AuthKey,
    ApiJson(req): ApiJson<SimilarRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    auth.require_read()?;
    Ok(Json(state.engine.similar(&req).await?))
}

/// Query parameters for `GET /v1/search/errors/grouped`.
#[derive(Debug, Deserialize)]
pub struct GroupedErrorsQuery {
    pub service: Option<String>,
    pub hours: Option<i64>,
    pub limit: Option<i64>,
}

/// `GET /v1/search/errors/grouped`: errors grouped by
/// (error_type, message prefix).
pub async fn grouped_errors(
    State(state): State<AppState>,
    auth: AuthKey,
    Query(query): Query<GroupedErrorsQuery>,
) -> Result<Json<Vec<ErrorGroup>>, ApiError> {
    auth.require_read()?;
    let hours = validate_hours(query.hours)?;
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let groups = state
        .db
        .stats
        .grouped_errors(query.service.as_deref(), hours, limit)
        .await?;
    Ok(Json(groups))
}

/// Query parameters for `GET /v1/search/anomalies`.
#[derive(Debug, Deserialize)]
pub struct AnomaliesQuery {
    pub service: Option<String>,
    pub hours: Option<i64>,
}

/// `GET /v1/search/anomalies`: period-over-period findings.
pub async fn anomalies(
    State(state): State<AppState>,
    auth: AuthKey,
    Query(query): Query<AnomaliesQuery>,
) -> Result<Json<Vec<AnomalyFinding>>, ApiError> {
    auth.require_read()?;
    let hours = validate_hours(query.hours)?;
    let findings = state
        .anomaly
        .detect(query.service.as_deref(), hours)
        .await?;
    Ok(Json(findings))
}
