//! Core data models for logr.
//!
//! These types are shared across all logr crates and represent the
//! wire and storage shapes for log entries, events, spans, and API keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::defaults;
use crate::error::{Error, Result};

pub use pgvector::Vector;

// =============================================================================
// LOG LEVEL
// =============================================================================

/// Severity level of a log entry.
///
/// The persisted set is closed: aliases are normalized at the edge
/// ("warning" becomes `Warn`, "critical" becomes `Fatal`) and anything
/// else is rejected as a validation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    /// Lowercase storage form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Fatal => "fatal",
        }
    }

    /// All normalized levels, in ascending severity.
    pub fn all() -> [LogLevel; 5] {
        [
            Self::Debug,
            Self::Info,
            Self::Warn,
            Self::Error,
            Self::Fatal,
        ]
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            "fatal" | "critical" => Ok(Self::Fatal),
            other => Err(Error::Validation(format!(
                "invalid log level: {other}. Must be one of: debug, info, warn, error, fatal"
            ))),
        }
    }
}

// =============================================================================
// EVENT TYPE
// =============================================================================

/// Kind of payload attached to a log entry.
///
/// Closed set; validation rejects anything outside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Prompt,
    Completion,
    ToolCall,
    ToolResult,
    Retrieval,
    Context,
    SystemPrompt,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prompt => "prompt",
            Self::Completion => "completion",
            Self::ToolCall => "tool_call",
            Self::ToolResult => "tool_result",
            Self::Retrieval => "retrieval",
            Self::Context => "context",
            Self::SystemPrompt => "system_prompt",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "prompt" => Ok(Self::Prompt),
            "completion" => Ok(Self::Completion),
            "tool_call" => Ok(Self::ToolCall),
            "tool_result" => Ok(Self::ToolResult),
            "retrieval" => Ok(Self::Retrieval),
            "context" => Ok(Self::Context),
            "system_prompt" => Ok(Self::SystemPrompt),
            other => Err(Error::Validation(format!(
                "invalid event type: {other}. Must be one of: completion, context, prompt, \
                 retrieval, system_prompt, tool_call, tool_result"
            ))),
        }
    }
}

// =============================================================================
// SPAN ENUMS
// =============================================================================

/// OpenTelemetry-style span kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    Client,
    Server,
    Producer,
    Consumer,
    #[default]
    Internal,
}

impl SpanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Server => "server",
            Self::Producer => "producer",
            Self::Consumer => "consumer",
            Self::Internal => "internal",
        }
    }
}

impl std::str::FromStr for SpanKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "client" => Ok(Self::Client),
            "server" => Ok(Self::Server),
            "producer" => Ok(Self::Producer),
            "consumer" => Ok(Self::Consumer),
            "internal" => Ok(Self::Internal),
            other => Err(Error::Validation(format!("invalid span kind: {other}"))),
        }
    }
}

/// Span completion status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanStatus {
    Ok,
    Error,
    #[default]
    Unset,
}

impl SpanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Unset => "unset",
        }
    }
}

impl std::str::FromStr for SpanStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ok" => Ok(Self::Ok),
            "error" => Ok(Self::Error),
            "unset" => Ok(Self::Unset),
            other => Err(Error::Validation(format!("invalid span status: {other}"))),
        }
    }
}

// =============================================================================
// ENTITIES
// =============================================================================

/// A persisted structured log entry, including its child events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: Uuid,
    pub service: String,
    pub environment: String,
    pub host: Option<String>,
    pub version: Option<String>,
    pub level: LogLevel,
    pub message: String,
    pub context: JsonValue,
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    pub parent_span_id: Option<String>,
    pub request_id: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: Option<f64>,
    pub model: Option<String>,
    pub tokens_in: Option<i64>,
    pub tokens_out: Option<i64>,
    pub cost_usd: Option<f64>,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub stack_trace: Option<String>,
    pub embedding_model: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub events: Vec<LogEvent>,
}

/// A child payload (prompt, completion, tool call, ...) owned by one
/// log entry. Cascade-deleted with its parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    pub id: Uuid,
    pub log_entry_id: Uuid,
    pub event_type: EventType,
    pub content: String,
    pub content_type: Option<String>,
    /// Persisted in column `event_metadata`; `metadata` is a reserved
    /// name in some schema tooling.
    pub metadata: JsonValue,
    pub sequence: i32,
    pub duration_ms: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// A distributed-tracing span.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub id: Uuid,
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub service: String,
    pub operation: String,
    pub kind: SpanKind,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<f64>,
    pub status: SpanStatus,
    pub status_message: Option<String>,
    pub attributes: JsonValue,
    pub resource: JsonValue,
    pub created_at: DateTime<Utc>,
}

/// API key metadata. The plaintext key is never stored; only the
/// SHA-256 hash and a 12-character display prefix are persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub key_prefix: String,
    pub can_write: bool,
    pub can_read: bool,
    pub can_admin: bool,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Service account grouping API keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceAccount {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// INGEST REQUESTS
// =============================================================================

fn default_environment() -> String {
    "production".to_string()
}

/// Request body for creating a single log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLogRequest {
    pub service: String,
    pub level: String,
    pub message: String,
    #[serde(default)]
    pub context: JsonValue,
    #[serde(default)]
    pub events: Vec<CreateEventRequest>,
    #[serde(default = "default_environment")]
    pub environment: String,
    pub host: Option<String>,
    pub version: Option<String>,
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    pub parent_span_id: Option<String>,
    pub request_id: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub duration_ms: Option<f64>,
    pub model: Option<String>,
    pub tokens_in: Option<i64>,
    pub tokens_out: Option<i64>,
    pub cost_usd: Option<f64>,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub stack_trace: Option<String>,
}

impl CreateLogRequest {
    /// Validate domain rules and return the normalized level.
    ///
    /// Checks, in order: service presence/length, level taxonomy,
    /// message length, serialized context size, id lengths, and each
    /// event. Shape-level problems (missing fields) never reach here;
    /// the deserializer rejects those.
    pub fn validate(&self) -> Result<LogLevel> {
        if self.service.is_empty() {
            return Err(Error::Validation("service must not be empty".into()));
        }
        if self.service.len() > defaults::SERVICE_MAX_LENGTH {
            return Err(Error::Validation(format!(
                "service too long. Maximum length: {} characters",
                defaults::SERVICE_MAX_LENGTH
            )));
        }

        let level: LogLevel = self.level.parse()?;

        if self.message.len() > defaults::MESSAGE_MAX_LENGTH {
            return Err(Error::Validation(format!(
                "message too long. Maximum length: {} characters",
                defaults::MESSAGE_MAX_LENGTH
            )));
        }

        let context_size = serde_json::to_string(&self.context)
            .map(|s| s.len())
            .unwrap_or(0);
        if context_size > defaults::CONTEXT_MAX_BYTES {
            return Err(Error::Validation(format!(
                "context too large. Maximum size: {} bytes",
                defaults::CONTEXT_MAX_BYTES
            )));
        }

        for id in [
            &self.trace_id,
            &self.span_id,
            &self.parent_span_id,
            &self.request_id,
            &self.user_id,
            &self.session_id,
        ]
        .into_iter()
        .flatten()
        {
            if id.len() > defaults::CORRELATION_ID_MAX_LENGTH {
                return Err(Error::Validation(format!(
                    "correlation id too long. Maximum length: {} characters",
                    defaults::CORRELATION_ID_MAX_LENGTH
                )));
            }
        }

        for event in &self.events {
            event.validate()?;
        }

        Ok(level)
    }
}

/// Child event attached to a log entry at ingest time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEventRequest {
    pub event_type: String,
    pub content: String,
    pub content_type: Option<String>,
    #[serde(default)]
    pub metadata: JsonValue,
    #[serde(default)]
    pub sequence: i32,
    pub duration_ms: Option<f64>,
}

impl CreateEventRequest {
    /// Validate the event type against the closed set and the content
    /// length limit; returns the parsed type.
    pub fn validate(&self) -> Result<EventType> {
        let event_type: EventType = self.event_type.parse()?;
        if self.content.len() > defaults::EVENT_CONTENT_MAX_LENGTH {
            return Err(Error::Validation(format!(
                "event content too long. Maximum length: {} characters",
                defaults::EVENT_CONTENT_MAX_LENGTH
            )));
        }
        Ok(event_type)
    }
}

/// Batch of log entries (up to [`defaults::BATCH_MAX_ITEMS`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogBatchRequest {
    pub logs: Vec<CreateLogRequest>,
}

/// Outcome of a batch ingest. Per-item failures never abort the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    pub accepted: usize,
    pub failed: usize,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// Request body for creating a span.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSpanRequest {
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub service: String,
    pub operation: String,
    pub kind: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<f64>,
    pub status: Option<String>,
    pub status_message: Option<String>,
    #[serde(default)]
    pub attributes: JsonValue,
    #[serde(default)]
    pub resource: JsonValue,
}

impl CreateSpanRequest {
    /// Validate domain rules; returns the parsed kind and status.
    pub fn validate(&self) -> Result<(SpanKind, SpanStatus)> {
        if self.service.is_empty() {
            return Err(Error::Validation("service must not be empty".into()));
        }
        if self.service.len() > defaults::SERVICE_MAX_LENGTH {
            return Err(Error::Validation(format!(
                "service too long. Maximum length: {} characters",
                defaults::SERVICE_MAX_LENGTH
            )));
        }
        if self.trace_id.is_empty() || self.span_id.is_empty() {
            return Err(Error::Validation(
                "trace_id and span_id must not be empty".into(),
            ));
        }
        for id in [
            Some(&self.trace_id),
            Some(&self.span_id),
            self.parent_span_id.as_ref(),
        ]
        .into_iter()
        .flatten()
        {
            if id.len() > defaults::CORRELATION_ID_MAX_LENGTH {
                return Err(Error::Validation(format!(
                    "correlation id too long. Maximum length: {} characters",
                    defaults::CORRELATION_ID_MAX_LENGTH
                )));
            }
        }

        let kind = match &self.kind {
            Some(k) => k.parse()?,
            None => SpanKind::default(),
        };
        let status = match &self.status {
            Some(s) => s.parse()?,
            None => SpanStatus::default(),
        };
        Ok((kind, status))
    }
}

/// Batch of spans.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanBatchRequest {
    pub spans: Vec<CreateSpanRequest>,
}

// =============================================================================
// QUERY REQUESTS / RESPONSES
// =============================================================================

/// Conjunction of filters for listing log entries.
#[derive(Debug, Clone, Default)]
pub struct ListLogsRequest {
    pub service: Option<String>,
    pub level: Option<LogLevel>,
    pub environment: Option<String>,
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    pub request_id: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub model: Option<String>,
    pub error_type: Option<String>,
    /// `Some(true)` keeps only rows with a non-null error_type,
    /// `Some(false)` only rows without one.
    pub has_error: Option<bool>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub min_duration_ms: Option<f64>,
    pub max_duration_ms: Option<f64>,
    /// Case-insensitive substring match on message.
    pub search: Option<String>,
    /// 1-based page number.
    pub page: i64,
    /// Page size, clamped to 1..=500 by callers.
    pub page_size: i64,
}

/// One page of log entries, timestamp-descending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListLogsResponse {
    pub logs: Vec<LogEntry>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub has_more: bool,
}

/// All log entries sharing a trace_id, with derived trace facts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogTraceResponse {
    pub trace_id: String,
    pub logs: Vec<LogEntry>,
    pub services: Vec<String>,
    pub span_count: i64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_duration_ms: f64,
}

/// Per-service entry count for the stats window (top 20 by count).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCount {
    pub service: String,
    pub count: i64,
}

/// Per-model usage aggregation; NULL token/cost values sum as 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelUsage {
    pub model: String,
    pub count: i64,
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub cost_usd: f64,
}

/// Per-error-type count for the stats window (top 10 by count).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorTypeCount {
    pub error_type: String,
    pub count: i64,
}

/// Latency distribution over non-null durations (continuous percentiles).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencyStats {
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

/// Time-windowed aggregation over the last `time_window_hours` hours.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogStats {
    pub time_window_hours: i64,
    pub service: Option<String>,
    pub total: i64,
    pub by_level: std::collections::BTreeMap<String, i64>,
    pub by_service: Vec<ServiceCount>,
    pub by_model: Vec<ModelUsage>,
    pub by_error: Vec<ErrorTypeCount>,
    pub latency: Option<LatencyStats>,
}

/// Filters for listing spans.
#[derive(Debug, Clone, Default)]
pub struct ListSpansRequest {
    pub service: Option<String>,
    pub trace_id: Option<String>,
    pub operation: Option<String>,
    pub status: Option<SpanStatus>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: i64,
}

/// A span with its children, forming the trace tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanNode {
    #[serde(flatten)]
    pub span: Span,
    pub children: Vec<SpanNode>,
}

/// All spans of a trace plus the reconstructed parent→children tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanTraceResponse {
    pub trace_id: String,
    pub spans: Vec<Span>,
    pub tree: Vec<SpanNode>,
    pub services: Vec<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

// =============================================================================
// SEARCH TYPES
// =============================================================================

/// Retrieval mode for semantic search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// BM25 + vector + heuristic, fused via RRF (default).
    #[default]
    Ensemble,
    /// Dense-vector only; degrades to ensemble without a query embedding.
    Vector,
    /// Lexical full-text only.
    Bm25,
    /// ILIKE substring fallback.
    Text,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ensemble => "ensemble",
            Self::Vector => "vector",
            Self::Bm25 => "bm25",
            Self::Text => "text",
        }
    }
}

fn default_search_limit() -> i64 {
    defaults::SEARCH_DEFAULT_LIMIT
}

/// Request body for `POST /v1/search/semantic`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub mode: SearchMode,
    pub service: Option<String>,
    pub level: Option<String>,
    pub since: Option<DateTime<Utc>>,
    #[serde(default = "default_search_limit")]
    pub limit: i64,
}

/// One candidate emitted by a single retriever, before fusion.
///
/// `score` is signal-local (ts_rank_cd for BM25, cosine similarity for
/// vector, recency rank for text) and only meaningful for ordering
/// within its own list.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: Uuid,
    pub service: String,
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub trace_id: Option<String>,
    pub error_type: Option<String>,
    pub score: f32,
}

/// One fused search result. `signals` maps signal name to its RRF
/// contribution; `similarity` is the fused score normalized to [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: Uuid,
    pub service: String,
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub trace_id: Option<String>,
    pub error_type: Option<String>,
    pub similarity: f32,
    pub signals: std::collections::BTreeMap<String, f32>,
}

/// Response for semantic/similar search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    /// Mode actually used after degradation.
    pub mode: String,
    /// Signals that produced candidates, in fusion order.
    pub signals_used: Vec<String>,
    pub results: Vec<SearchHit>,
}

fn default_true() -> bool {
    true
}

/// Request body for `POST /v1/search/similar`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarRequest {
    pub log_id: Uuid,
    #[serde(default = "default_search_limit")]
    pub limit: i64,
    /// Exclude results from the reference entry's own trace.
    #[serde(default = "default_true")]
    pub exclude_same_trace: bool,
}

/// One row of `GET /v1/search/errors/grouped`: errors grouped by
/// (error_type, first 100 chars of message).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorGroup {
    pub error_type: String,
    pub message_prefix: String,
    pub count: i64,
    pub services: Vec<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

// =============================================================================
// ANOMALY TYPES
// =============================================================================

/// Kind of anomaly finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    ErrorRateSpike,
    LatencySpike,
    NewErrorTypes,
}

/// Severity of an anomaly finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalySeverity {
    Medium,
    High,
}

/// One period-over-period anomaly finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyFinding {
    #[serde(rename = "type")]
    pub anomaly_type: AnomalyType,
    pub severity: AnomalySeverity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_types: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parse_normalizes_aliases() {
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("critical".parse::<LogLevel>().unwrap(), LogLevel::Fatal);
        assert_eq!("CRITICAL".parse::<LogLevel>().unwrap(), LogLevel::Fatal);
        assert_eq!("INFO".parse::<LogLevel>().unwrap(), LogLevel::Info);
    }

    #[test]
    fn test_level_parse_rejects_unknown() {
        let err = "banana".parse::<LogLevel>().unwrap_err();
        assert!(err.to_string().contains("invalid log level"));
    }

    #[test]
    fn test_level_roundtrip_is_closed_set() {
        for level in LogLevel::all() {
            let parsed: LogLevel = level.as_str().parse().unwrap();
            assert_eq!(parsed, level);
        }
    }

    #[test]
    fn test_level_serde_lowercase() {
        assert_eq!(serde_json::to_string(&LogLevel::Fatal).unwrap(), "\"fatal\"");
        let level: LogLevel = serde_json::from_str("\"warn\"").unwrap();
        assert_eq!(level, LogLevel::Warn);
    }

    #[test]
    fn test_event_type_closed_set() {
        assert_eq!(
            "system_prompt".parse::<EventType>().unwrap(),
            EventType::SystemPrompt
        );
        let err = "invalid_type".parse::<EventType>().unwrap_err();
        assert!(err.to_string().contains("invalid event type"));
    }

    #[test]
    fn test_span_kind_defaults_internal() {
        assert_eq!(SpanKind::default(), SpanKind::Internal);
        assert_eq!(SpanStatus::default(), SpanStatus::Unset);
    }

    fn minimal_log_request() -> CreateLogRequest {
        serde_json::from_value(serde_json::json!({
            "service": "taskr-bot",
            "level": "INFO",
            "message": "hello"
        }))
        .unwrap()
    }

    #[test]
    fn test_create_log_request_defaults() {
        let req = minimal_log_request();
        assert_eq!(req.environment, "production");
        assert!(req.events.is_empty());
        assert_eq!(req.validate().unwrap(), LogLevel::Info);
    }

    #[test]
    fn test_create_log_request_missing_field_is_shape_error() {
        let result: std::result::Result<CreateLogRequest, _> =
            serde_json::from_value(serde_json::json!({"service": "x"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_empty_service() {
        let mut req = minimal_log_request();
        req.service = String::new();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_long_service() {
        let mut req = minimal_log_request();
        req.service = "s".repeat(defaults::SERVICE_MAX_LENGTH + 1);
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_long_message() {
        let mut req = minimal_log_request();
        req.message = "m".repeat(defaults::MESSAGE_MAX_LENGTH + 1);
        let err = req.validate().unwrap_err();
        assert!(err.to_string().contains("message too long"));
    }

    #[test]
    fn test_validate_rejects_bad_event_type() {
        let mut req = minimal_log_request();
        req.events.push(CreateEventRequest {
            event_type: "not_a_type".into(),
            content: "x".into(),
            content_type: None,
            metadata: JsonValue::Null,
            sequence: 0,
            duration_ms: None,
        });
        let err = req.validate().unwrap_err();
        assert!(err.to_string().contains("invalid event type"));
    }

    #[test]
    fn test_validate_rejects_long_correlation_id() {
        let mut req = minimal_log_request();
        req.trace_id = Some("t".repeat(defaults::CORRELATION_ID_MAX_LENGTH + 1));
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_span_request_validate_parses_kind_and_status() {
        let req: CreateSpanRequest = serde_json::from_value(serde_json::json!({
            "trace_id": "trace-1",
            "span_id": "span-1",
            "service": "taskr-bot",
            "operation": "fetch",
            "kind": "client",
            "status": "ok",
            "start_time": "2026-07-01T00:00:00Z"
        }))
        .unwrap();
        let (kind, status) = req.validate().unwrap();
        assert_eq!(kind, SpanKind::Client);
        assert_eq!(status, SpanStatus::Ok);
    }

    #[test]
    fn test_span_request_defaults() {
        let req: CreateSpanRequest = serde_json::from_value(serde_json::json!({
            "trace_id": "trace-1",
            "span_id": "span-1",
            "service": "taskr-bot",
            "operation": "fetch",
            "start_time": "2026-07-01T00:00:00Z"
        }))
        .unwrap();
        let (kind, status) = req.validate().unwrap();
        assert_eq!(kind, SpanKind::Internal);
        assert_eq!(status, SpanStatus::Unset);
    }

    #[test]
    fn test_search_request_defaults() {
        let req: SearchRequest =
            serde_json::from_value(serde_json::json!({"query": "db timeout"})).unwrap();
        assert_eq!(req.mode, SearchMode::Ensemble);
        assert_eq!(req.limit, defaults::SEARCH_DEFAULT_LIMIT);
    }

    #[test]
    fn test_anomaly_type_wire_form() {
        let finding = AnomalyFinding {
            anomaly_type: AnomalyType::ErrorRateSpike,
            severity: AnomalySeverity::High,
            message: "error rate spiked".into(),
            previous: Some(0.02),
            current: Some(0.17),
            error_types: None,
        };
        let json = serde_json::to_value(&finding).unwrap();
        assert_eq!(json["type"], "error_rate_spike");
        assert_eq!(json["severity"], "high");
        assert!(json.get("error_types").is_none());
    }
}
