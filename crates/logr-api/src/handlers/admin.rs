//! Master-key admin surface: service accounts, API keys, pipeline
//! status, and retention cleanup.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use logr_core::{ApiKey, ServiceAccount};
use logr_pipeline::PipelineStatus;

use crate::auth::MasterAuth;
use crate::error::{ApiError, ApiJson};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateServiceAccountRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateServiceAccountResponse {
    pub service_account_id: Uuid,
    pub name: String,
    pub api_key: String,
    pub key_prefix: String,
    pub message: String,
}

fn default_key_name() -> String {
    "Default".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct IssueKeyRequest {
    pub service_account_name: String,
    #[serde(default = "default_key_name")]
    pub key_name: String,
    #[serde(default = "default_true")]
    pub can_write: bool,
    #[serde(default = "default_true")]
    pub can_read: bool,
}

#[derive(Debug, Serialize)]
pub struct IssueKeyResponse {
    pub id: Uuid,
    pub name: String,
    pub api_key: String,
    pub key_prefix: String,
    pub service_account: String,
}

#[derive(Debug, Serialize)]
pub struct ServiceAccountList {
    pub service_accounts: Vec<ServiceAccount>,
}

#[derive(Debug, Serialize)]
pub struct ApiKeyList {
    pub keys: Vec<ApiKey>,
}

/// `GET /v1/admin/service-accounts`.
pub async fn list_service_accounts(
    State(state): State<AppState>,
    _auth: MasterAuth,
) -> Result<Json<ServiceAccountList>, ApiError> {
    let service_accounts = state.db.api_keys.list_service_accounts().await?;
    Ok(Json(ServiceAccountList { service_accounts }))
}

/// `POST /v1/admin/service-accounts`: create an account plus its
/// initial read/write key. The plaintext key appears exactly once, in
/// this response.
pub async fn create_service_account(
    State(state): State<AppState>,
    _auth: MasterAuth,
    ApiJson(req): ApiJson<CreateServiceAccountRequest>,
) -> Result<Json<CreateServiceAccountResponse>, ApiError> {
    let account = state
        .db
        .api_keys
        .create_service_account(&req.name, req.description.as_deref())
        .await?;

    let (key, plaintext) = state
        .db
        .api_keys
        .create_key(
            &format!("{}-default", account.name),
            req.description.as_deref(),
            true,
            true,
            false,
        )
        .await?;

    Ok(Json(CreateServiceAccountResponse {
        service_account_id: account.id,
        name: account.name,
        api_key: plaintext,
        key_prefix: key.key_prefix,
        message: "Service account created. Store the API key securely - it won't be shown again."
            .to_string(),
    }))
}

/// `POST /v1/admin/keys`: issue a key for an existing account.
pub async fn issue_key(
    State(state): State<AppState>,
    _auth: MasterAuth,
    ApiJson(req): ApiJson<IssueKeyRequest>,
) -> Result<Json<IssueKeyResponse>, ApiError> {
    let account = state
        .db
        .api_keys
        .find_service_account(&req.service_account_name)
        .await?
        .ok_or_else(|| {
            ApiError::not_found(format!(
                "service account '{}'",
                req.service_account_name
            ))
        })?;

    let (key, plaintext) = state
        .db
        .api_keys
        .create_key(&req.key_name, None, req.can_write, req.can_read, false)
        .await?;

    Ok(Json(IssueKeyResponse {
        id: key.id,
        name: key.name,
        api_key: plaintext,
        key_prefix: key.key_prefix,
        service_account: account.name,
    }))
}

/// `GET /v1/admin/keys`: key metadata only; hashes and plaintext are
/// never listed.
pub async fn list_keys(
    State(state): State<AppState>,
    _auth: MasterAuth,
) -> Result<Json<ApiKeyList>, ApiError> {
    let keys = state.db.api_keys.list().await?;
    Ok(Json(ApiKeyList { keys }))
}

/// `DELETE /v1/admin/keys/{id}`: mark revoked; the row is retained.
pub async fn revoke_key(
    State(state): State<AppState>,
    _auth: MasterAuth,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let key = state.db.api_keys.revoke(id).await?;
    Ok(Json(serde_json::json!({
        "message": format!("API key {}... revoked", key.key_prefix)
    })))
}

/// `GET /v1/admin/embeddings/status`: pipeline counters snapshot.
pub async fn embeddings_status(
    State(state): State<AppState>,
    _auth: MasterAuth,
) -> Result<Json<PipelineStatus>, ApiError> {
    Ok(Json(state.pipeline.status()))
}

/// `POST /v1/admin/retention/cleanup`: delete aged-out entries,
/// honoring per-service policies; returns the deleted count.
pub async fn retention_cleanup(
    State(state): State<AppState>,
    _auth: MasterAuth,
) -> Result<Json<serde_json::Value>, ApiError> {
    let deleted = state
        .db
        .retention
        .cleanup(state.settings.log_retention_days)
        .await?;
    Ok(Json(serde_json::json!({ "deleted": deleted })))
}
