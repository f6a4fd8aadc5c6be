//! Environment-driven configuration.

use crate::defaults;
use crate::error::{Error, Result};

/// Application settings loaded from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    /// PostgreSQL connection string. Accepts `postgres://` and
    /// `postgresql://`; normalized to `postgresql://` internally.
    pub database_url: String,
    /// Master key for admin endpoints. Admin surface returns 503 when unset.
    pub master_api_key: Option<String>,
    /// Log retention window in days (0 = keep forever).
    pub log_retention_days: i64,
    /// Embedding model requested from the provider.
    pub embedding_model: String,
    /// Expected embedding vector dimension.
    pub embedding_dimensions: usize,
    /// Embedding provider API key. Pipeline is disabled when unset.
    pub artemis_api_key: Option<String>,
    /// Embedding provider base URL.
    pub artemis_url: String,
    /// Daily cap on embeddings generated by the pipeline.
    pub embedding_daily_cap: i64,
    /// HTTP listen port.
    pub port: u16,
    /// Per-key request limit per minute.
    pub rate_limit_per_minute: u32,
}

impl Settings {
    /// Load settings from environment variables, applying defaults.
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| Error::Config("DATABASE_URL is required".into()))?;

        Ok(Self {
            database_url: normalize_database_url(&database_url),
            master_api_key: non_empty_var("MASTER_API_KEY"),
            log_retention_days: parsed_var("LOG_RETENTION_DAYS", defaults::RETENTION_DAYS),
            embedding_model: std::env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| defaults::EMBED_MODEL.to_string()),
            embedding_dimensions: parsed_var("EMBEDDING_DIMENSIONS", defaults::EMBED_DIMENSION),
            artemis_api_key: non_empty_var("ARTEMIS_API_KEY"),
            artemis_url: std::env::var("ARTEMIS_URL")
                .unwrap_or_else(|_| "https://artemis.jettaintelligence.com".to_string()),
            embedding_daily_cap: parsed_var("EMBEDDING_DAILY_CAP", defaults::PIPELINE_DAILY_CAP),
            port: parsed_var("PORT", defaults::SERVER_PORT),
            rate_limit_per_minute: parsed_var(
                "RATE_LIMIT_PER_MINUTE",
                defaults::RATE_LIMIT_REQUESTS,
            ),
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Normalize a connection string to the `postgresql://` scheme.
///
/// Some platforms hand out `postgres://` URLs; sqlx accepts both, but a
/// single canonical form keeps logging and comparisons predictable.
pub fn normalize_database_url(url: &str) -> String {
    match url.strip_prefix("postgres://") {
        Some(rest) => format!("postgresql://{rest}"),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_postgres_scheme() {
        assert_eq!(
            normalize_database_url("postgres://u:p@host:5432/logr"),
            "postgresql://u:p@host:5432/logr"
        );
    }

    #[test]
    fn test_normalize_postgresql_scheme_untouched() {
        let url = "postgresql://u:p@host:5432/logr";
        assert_eq!(normalize_database_url(url), url);
    }

    #[test]
    fn test_normalize_other_scheme_untouched() {
        let url = "sqlite://memory";
        assert_eq!(normalize_database_url(url), url);
    }
}
