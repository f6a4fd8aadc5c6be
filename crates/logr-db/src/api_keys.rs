//! API key and service account repository.
//!
//! Keys are stored as SHA-256 hashes only; the plaintext exists exactly
//! once, in the creation response.

use base64::Engine as _;
use chrono::Utc;
use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::{Pool, Postgres, Row};
use tracing::warn;
use uuid::Uuid;

use logr_core::{defaults, ApiKey, Error, Result, ServiceAccount};

/// Generate a new API key: `logr_` followed by 32 random bytes,
/// base64url-encoded without padding.
pub fn generate_api_key() -> String {
    let mut bytes = [0u8; defaults::KEY_RANDOM_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!(
        "logr_{}",
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
    )
}

/// SHA-256 hex digest of a plaintext key, the only form persisted.
pub fn hash_api_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Display prefix of a key (first 12 characters).
pub fn key_prefix(key: &str) -> String {
    key.chars().take(defaults::KEY_PREFIX_LENGTH).collect()
}

const KEY_COLUMNS: &str = "id, name, description, key_prefix, can_write, can_read, can_admin, \
     revoked, revoked_at, created_at, last_used_at";

/// PostgreSQL implementation of the API key repository.
pub struct PgApiKeyRepository {
    pool: Pool<Postgres>,
}

impl PgApiKeyRepository {
    /// Create a new PgApiKeyRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Create a key and return its metadata plus the plaintext.
    pub async fn create_key(
        &self,
        name: &str,
        description: Option<&str>,
        can_write: bool,
        can_read: bool,
        can_admin: bool,
    ) -> Result<(ApiKey, String)> {
        let plaintext = generate_api_key();
        let id = Uuid::new_v4();
        let now = Utc::now();
        let prefix = key_prefix(&plaintext);

        sqlx::query(
            r#"
            INSERT INTO api_keys (
                id, name, description, key_hash, key_prefix,
                can_write, can_read, can_admin, revoked, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0, $9)
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(description)
        .bind(hash_api_key(&plaintext))
        .bind(&prefix)
        .bind(can_write as i32)
        .bind(can_read as i32)
        .bind(can_admin as i32)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        let key = ApiKey {
            id,
            name: name.to_string(),
            description: description.map(String::from),
            key_prefix: prefix,
            can_write,
            can_read,
            can_admin,
            revoked: false,
            revoked_at: None,
            created_at: now,
            last_used_at: None,
        };
        Ok((key, plaintext))
    }

    /// Look up an active key by the SHA-256 hash of its plaintext.
    pub async fn find_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>> {
        let sql = format!("SELECT {KEY_COLUMNS} FROM api_keys WHERE key_hash = $1 AND revoked = 0");
        let row = sqlx::query(&sql)
            .bind(key_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.map(map_key_row))
    }

    /// Best-effort `last_used_at` update. Never fails the request:
    /// errors are logged and swallowed.
    pub async fn touch_last_used(&self, id: Uuid) {
        let result = sqlx::query("UPDATE api_keys SET last_used_at = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await;

        if let Err(e) = result {
            warn!(
                subsystem = "db",
                component = "api_keys",
                key_id = %id,
                error = %e,
                "Failed to update last_used_at"
            );
        }
    }

    /// All keys, oldest first. Plaintext and hash are never exposed.
    pub async fn list(&self) -> Result<Vec<ApiKey>> {
        let sql = format!("SELECT {KEY_COLUMNS} FROM api_keys ORDER BY created_at");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(rows.into_iter().map(map_key_row).collect())
    }

    /// Mark a key revoked. The row is retained as an audit trail.
    pub async fn revoke(&self, id: Uuid) -> Result<ApiKey> {
        let sql = format!(
            "UPDATE api_keys SET revoked = 1, revoked_at = $1 WHERE id = $2 \
             RETURNING {KEY_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(Utc::now())
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?
            .ok_or_else(|| Error::NotFound(format!("API key {id}")))?;

        Ok(map_key_row(row))
    }

    /// Create a service account; duplicate names are a validation error.
    pub async fn create_service_account(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> Result<ServiceAccount> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        let result = sqlx::query(
            "INSERT INTO service_accounts (id, name, description, created_at) \
             VALUES ($1, $2, $3, $4) ON CONFLICT (name) DO NOTHING",
        )
        .bind(id)
        .bind(name)
        .bind(description)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::Validation(format!(
                "service account '{name}' already exists"
            )));
        }

        Ok(ServiceAccount {
            id,
            name: name.to_string(),
            description: description.map(String::from),
            created_at: now,
        })
    }

    /// All service accounts, oldest first.
    pub async fn list_service_accounts(&self) -> Result<Vec<ServiceAccount>> {
        let rows = sqlx::query(
            "SELECT id, name, description, created_at FROM service_accounts ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| ServiceAccount {
                id: row.get("id"),
                name: row.get("name"),
                description: row.get("description"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    /// Find a service account by name.
    pub async fn find_service_account(&self, name: &str) -> Result<Option<ServiceAccount>> {
        let row = sqlx::query(
            "SELECT id, name, description, created_at FROM service_accounts WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(|row| ServiceAccount {
            id: row.get("id"),
            name: row.get("name"),
            description: row.get("description"),
            created_at: row.get("created_at"),
        }))
    }
}

fn map_key_row(row: sqlx::postgres::PgRow) -> ApiKey {
    ApiKey {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        key_prefix: row.get("key_prefix"),
        can_write: row.get::<i32, _>("can_write") != 0,
        can_read: row.get::<i32, _>("can_read") != 0,
        can_admin: row.get::<i32, _>("can_admin") != 0,
        revoked: row.get::<i32, _>("revoked") != 0,
        revoked_at: row.get("revoked_at"),
        created_at: row.get("created_at"),
        last_used_at: row.get("last_used_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_key_format() {
        let key = generate_api_key();
        assert!(key.starts_with("logr_"));
        // 32 bytes base64url without padding is 43 characters.
        assert_eq!(key.len(), "logr_".len() + 43);
    }

    #[test]
    fn test_generated_keys_are_unique() {
        assert_ne!(generate_api_key(), generate_api_key());
    }

    #[test]
    fn test_hash_is_sha256_hex() {
        let hash = hash_api_key("logr_test");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        // Deterministic
        assert_eq!(hash, hash_api_key("logr_test"));
        assert_ne!(hash, hash_api_key("logr_other"));
    }

    #[test]
    fn test_key_prefix_is_12_chars() {
        let key = generate_api_key();
        let prefix = key_prefix(&key);
        assert_eq!(prefix.len(), 12);
        assert!(key.starts_with(&prefix));
    }

    #[test]
    fn test_key_prefix_short_input() {
        assert_eq!(key_prefix("logr_ab"), "logr_ab");
    }
}
