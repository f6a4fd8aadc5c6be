//! Centralized default constants for the logr system.
//!
//! **This module is the single source of truth** for all shared default
//! values. Crates reference these constants instead of defining their
//! own magic numbers.

// =============================================================================
// INGEST LIMITS
// =============================================================================

/// Maximum length of a service name in characters.
pub const SERVICE_MAX_LENGTH: usize = 100;

/// Maximum log message length in characters (100 KB).
pub const MESSAGE_MAX_LENGTH: usize = 100_000;

/// Maximum serialized context size in bytes (1 MB).
pub const CONTEXT_MAX_BYTES: usize = 1_000_000;

/// Maximum event content length in characters (10 MB).
pub const EVENT_CONTENT_MAX_LENGTH: usize = 10_000_000;

/// Maximum length of trace/span/request/user/session ids.
pub const CORRELATION_ID_MAX_LENGTH: usize = 100;

/// Maximum entries or spans per batch request.
pub const BATCH_MAX_ITEMS: usize = 1000;

/// Maximum error strings reported back from a batch.
pub const BATCH_MAX_ERRORS: usize = 10;

// =============================================================================
// PAGINATION
// =============================================================================

/// Default page size for log listing.
pub const PAGE_SIZE: i64 = 50;

/// Maximum page size for log listing.
pub const PAGE_SIZE_MAX: i64 = 500;

/// Default limit for span listing.
pub const SPAN_LIST_LIMIT: i64 = 100;

// =============================================================================
// STATS
// =============================================================================

/// Default stats window in hours.
pub const STATS_DEFAULT_HOURS: i64 = 24;

/// Maximum stats window in hours (7 days).
pub const STATS_MAX_HOURS: i64 = 168;

/// Services reported in the stats window (top N by count).
pub const STATS_TOP_SERVICES: i64 = 20;

/// Error types reported in the stats window (top N by count).
pub const STATS_TOP_ERRORS: i64 = 10;

// =============================================================================
// SEARCH
// =============================================================================

/// Default result limit for search endpoints.
pub const SEARCH_DEFAULT_LIMIT: i64 = 10;

/// Maximum result limit for search endpoints.
pub const SEARCH_MAX_LIMIT: i64 = 50;

/// Per-retriever candidate pool cap.
pub const SEARCH_POOL_MAX: i64 = 100;

/// Candidate pool multiplier over the requested limit.
pub const SEARCH_POOL_FACTOR: i64 = 3;

/// RRF rank constant. The fused score of a document is the sum of
/// `1 / (RRF_K + rank)` over the signals that returned it (1-based
/// ranks). Cormack et al. (2009) default.
pub const RRF_K: f32 = 60.0;

/// Weight of the severity component in the heuristic score.
pub const HEURISTIC_LEVEL_WEIGHT: f32 = 0.6;

/// Weight of the recency component in the heuristic score.
pub const HEURISTIC_RECENCY_WEIGHT: f32 = 0.4;

/// Recency half-life in hours: `recency = 2^(-age_hours / 24)`.
pub const HEURISTIC_RECENCY_HALF_LIFE_HOURS: f64 = 24.0;

/// Message prefix length for similar-log ILIKE fallback.
pub const SIMILAR_FALLBACK_PREFIX: usize = 50;

/// Message prefix length for error grouping.
pub const ERROR_GROUP_PREFIX: usize = 100;

// =============================================================================
// EMBEDDING PIPELINE
// =============================================================================

/// Poll interval between pipeline cycles in seconds.
pub const PIPELINE_POLL_INTERVAL_SECS: u64 = 30;

/// Maximum rows embedded per cycle.
pub const PIPELINE_BATCH_SIZE: i64 = 50;

/// Default daily embedding cap (env `EMBEDDING_DAILY_CAP`).
pub const PIPELINE_DAILY_CAP: i64 = 50_000;

/// Minimum message length worth embedding.
pub const PIPELINE_MIN_MESSAGE_LENGTH: i64 = 20;

/// Services never embedded (loop prevention: our own logs and the
/// embedding provider's).
pub const PIPELINE_EXCLUDED_SERVICES: [&str; 2] = ["logr", "artemis"];

/// Levels never embedded (high volume, low search value).
pub const PIPELINE_EXCLUDED_LEVELS: [&str; 1] = ["debug"];

// =============================================================================
// EMBEDDING PROVIDER
// =============================================================================

/// Default embedding model.
pub const EMBED_MODEL: &str = "text-embedding-3-small";

/// Default embedding vector dimension.
pub const EMBED_DIMENSION: usize = 1536;

/// Timeout for batch embedding requests in seconds.
pub const EMBED_BATCH_TIMEOUT_SECS: u64 = 60;

/// Timeout for query embedding requests in seconds.
pub const EMBED_QUERY_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// ANOMALY DETECTION
// =============================================================================

/// Ratio over the previous window that flags a spike.
pub const ANOMALY_SPIKE_RATIO: f64 = 1.5;

/// Ratio over the previous window that escalates severity to high.
pub const ANOMALY_HIGH_RATIO: f64 = 2.0;

/// Minimum current-window errors for an error-rate finding.
pub const ANOMALY_MIN_ERRORS: i64 = 5;

/// Maximum new error types listed in a finding message.
pub const ANOMALY_MAX_LISTED_ERRORS: usize = 5;

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 8080;

/// Default rate limit: max requests per window per key.
pub const RATE_LIMIT_REQUESTS: u32 = 1000;

/// Default rate limit window in seconds.
pub const RATE_LIMIT_PERIOD_SECS: u64 = 60;

/// Bearer-token prefix length used as the rate-limit key.
pub const RATE_LIMIT_KEY_PREFIX: usize = 13;

/// Maximum request body size in bytes (10 MiB).
pub const MAX_BODY_SIZE_BYTES: usize = 10 * 1024 * 1024;

/// API key display prefix length.
pub const KEY_PREFIX_LENGTH: usize = 12;

/// Random bytes in a generated API key (base64url-encoded).
pub const KEY_RANDOM_BYTES: usize = 32;

// =============================================================================
// DATABASE
// =============================================================================

/// Minimum connections kept in the pool.
pub const POOL_MIN_CONNECTIONS: u32 = 5;

/// Maximum connections in the pool.
pub const POOL_MAX_CONNECTIONS: u32 = 15;

/// Default log retention window in days (0 = keep forever).
pub const RETENTION_DAYS: i64 = 90;

/// Rows deleted per retention cleanup batch.
pub const RETENTION_BATCH_SIZE: i64 = 5000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_weights_sum_to_one() {
        let sum = HEURISTIC_LEVEL_WEIGHT + HEURISTIC_RECENCY_WEIGHT;
        assert!((sum - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn pool_limits_ordered() {
        const {
            assert!(POOL_MIN_CONNECTIONS < POOL_MAX_CONNECTIONS);
            assert!(PAGE_SIZE <= PAGE_SIZE_MAX);
            assert!(SEARCH_DEFAULT_LIMIT <= SEARCH_MAX_LIMIT);
            assert!(PIPELINE_BATCH_SIZE <= PIPELINE_DAILY_CAP);
        }
    }

    #[test]
    fn spike_ratios_ordered() {
        assert!(ANOMALY_SPIKE_RATIO < ANOMALY_HIGH_RATIO);
    }
}
