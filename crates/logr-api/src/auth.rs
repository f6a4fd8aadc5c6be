//! Bearer-key authentication and scope checks.
//!
//! Keys are looked up by the SHA-256 of the presented plaintext; the
//! master key guards the admin surface with a constant-time compare.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use logr_core::ApiKey;
use logr_db::hash_api_key;

use crate::error::ApiError;
use crate::AppState;

/// Extract the bearer token from an Authorization header value.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    header?.strip_prefix("Bearer ")
}

/// Constant-time byte equality; length mismatch returns false without
/// leaking where the difference is.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// An authenticated API key, resolved from the bearer token.
pub struct AuthKey(pub ApiKey);

impl AuthKey {
    /// Require the read scope.
    pub fn require_read(&self) -> Result<(), ApiError> {
        if self.0.can_read {
            Ok(())
        } else {
            Err(ApiError::forbidden("API key does not have read permission"))
        }
    }

    /// Require the write scope.
    pub fn require_write(&self) -> Result<(), ApiError> {
        if self.0.can_write {
            Ok(())
        } else {
            Err(ApiError::forbidden("API key does not have write permission"))
        }
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthKey {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok());

        let token = bearer_token(header).ok_or_else(|| {
            ApiError::unauthorized(
                "Missing or invalid Authorization header. Use: Bearer <api_key>",
            )
        })?;

        let key = state
            .db
            .api_keys
            .find_by_hash(&hash_api_key(token))
            .await?
            .ok_or_else(|| ApiError::unauthorized("Invalid API key"))?;

        // Best-effort usage stamp; never blocks or fails the request.
        state.db.api_keys.touch_last_used(key.id).await;

        Ok(AuthKey(key))
    }
}

/// Proof that the request presented the master key.
pub struct MasterAuth;

#[axum::async_trait]
impl FromRequestParts<AppState> for MasterAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(master_key) = &state.settings.master_api_key else {
            return Err(ApiError::unconfigured("Master API key not configured"));
        };

        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        let token = bearer_token(header)
            .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?;

        if !constant_time_eq(token.as_bytes(), master_key.as_bytes()) {
            return Err(ApiError::unauthorized("Invalid master API key"));
        }

        Ok(MasterAuth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token(Some("Bearer logr_abc")), Some("logr_abc"));
        assert_eq!(bearer_token(Some("Basic dXNlcg==")), None);
        assert_eq!(bearer_token(Some("")), None);
        assert_eq!(bearer_token(None), None);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secres"));
        assert!(!constant_time_eq(b"secret", b"secret2"));
        assert!(!constant_time_eq(b"", b"x"));
        assert!(constant_time_eq(b"", b""));
    }

    fn key(can_read: bool, can_write: bool) -> AuthKey {
        AuthKey(ApiKey {
            id: Uuid::new_v4(),
            name: "test".into(),
            description: None,
            key_prefix: "logr_test123".into(),
            can_write,
            can_read,
            can_admin: false,
            revoked: false,
            revoked_at: None,
            created_at: Utc::now(),
            last_used_at: None,
        })
    }

    #[test]
    fn test_scope_checks() {
        assert!(key(true, false).require_read().is_ok());
        assert!(key(true, false).require_write().is_err());
        assert!(key(false, true).require_write().is_ok());
        assert!(key(false, true).require_read().is_err());
    }
}
