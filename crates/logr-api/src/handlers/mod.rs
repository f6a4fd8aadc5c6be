//! HTTP handlers, grouped by resource.

pub mod admin;
pub mod logs;
pub mod search;
pub mod spans;

use axum::extract::State;
use axum::Json;

use crate::AppState;

/// `GET /health`: liveness probe, bypasses auth and rate limiting.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "logr",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /`: service banner.
pub async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": "logr",
        "description": "Centralized structured logging service for AI-powered log analysis",
        "version": env!("CARGO_PKG_VERSION"),
        "health": "/health",
        "metrics": "/metrics",
    }))
}

/// `GET /metrics`: JSON metrics snapshot.
pub async fn metrics(State(state): State<AppState>) -> Json<crate::metrics::MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

/// `GET /metrics/prometheus`: Prometheus text exposition.
pub async fn metrics_prometheus(State(state): State<AppState>) -> String {
    state.metrics.prometheus()
}
