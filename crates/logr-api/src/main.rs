//! logr-api - HTTP API server for logr.

mod auth;
mod error;
mod handlers;
mod metrics;
mod middleware;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::Request;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use logr_core::{defaults, EmbeddingBackend, Settings};
use logr_db::{Database, PoolConfig};
use logr_inference::{ArtemisBackend, ArtemisConfig};
use logr_pipeline::{EmbeddingPipeline, PipelineConfig, PipelineHandle};
use logr_search::{AnomalyDetector, EnsembleSearchEngine};

use crate::metrics::ApiMetrics;
use crate::middleware::{build_limiter, KeyedLimiter};

/// Generates time-ordered UUIDv7 request correlation ids; they sort
/// chronologically, which keeps log correlation cheap.
#[derive(Clone, Default)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub engine: Arc<EnsembleSearchEngine>,
    pub anomaly: Arc<AnomalyDetector>,
    pub metrics: Arc<ApiMetrics>,
    pub limiter: Arc<KeyedLimiter>,
    pub settings: Arc<Settings>,
    pub pipeline: Arc<PipelineHandle>,
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/metrics/prometheus", get(handlers::metrics_prometheus))
        // Logs
        .route(
            "/v1/logs",
            post(handlers::logs::create_log).get(handlers::logs::list_logs),
        )
        .route("/v1/logs/batch", post(handlers::logs::create_logs_batch))
        .route("/v1/logs/services", get(handlers::logs::list_services))
        .route("/v1/logs/models", get(handlers::logs::list_models))
        .route("/v1/logs/stats", get(handlers::logs::get_stats))
        .route("/v1/logs/trace/:trace_id", get(handlers::logs::get_log_trace))
        .route("/v1/logs/:id", get(handlers::logs::get_log))
        // Spans
        .route(
            "/v1/spans",
            post(handlers::spans::create_span).get(handlers::spans::list_spans),
        )
        .route("/v1/spans/batch", post(handlers::spans::create_spans_batch))
        .route(
            "/v1/spans/trace/:trace_id",
            get(handlers::spans::get_span_trace),
        )
        // Search
        .route("/v1/search/semantic", post(handlers::search::semantic_search))
        .route("/v1/search/similar", post(handlers::search::similar_search))
        .route(
            "/v1/search/errors/grouped",
            get(handlers::search::grouped_errors),
        )
        .route("/v1/search/anomalies", get(handlers::search::anomalies))
        // Admin (master key)
        .route(
            "/v1/admin/service-accounts",
            get(handlers::admin::list_service_accounts)
                .post(handlers::admin::create_service_account),
        )
        .route(
            "/v1/admin/keys",
            get(handlers::admin::list_keys).post(handlers::admin::issue_key),
        )
        .route("/v1/admin/keys/:id", delete(handlers::admin::revoke_key))
        .route(
            "/v1/admin/embeddings/status",
            get(handlers::admin::embeddings_status),
        )
        .route(
            "/v1/admin/retention/cleanup",
            post(handlers::admin::retention_cleanup),
        )
        // Middleware, innermost first: body cap, rate limit, size
        // check, metrics; request-id + trace + CORS outermost.
        .layer(RequestBodyLimitLayer::new(defaults::MAX_BODY_SIZE_BYTES))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit,
        ))
        .layer(axum::middleware::from_fn(middleware::request_size_limit))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::track_metrics,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logr_core::logging::init();

    let settings = Settings::from_env()?;

    let db = Database::connect_with_config(&settings.database_url, PoolConfig::default()).await?;
    let vector_available = db.init_schema(settings.embedding_dimensions).await?;

    let backend: Option<Arc<dyn EmbeddingBackend>> = match &settings.artemis_api_key {
        Some(api_key) => {
            let config = ArtemisConfig::new(&settings.artemis_url, api_key)
                .with_model(&settings.embedding_model)
                .with_dimension(settings.embedding_dimensions);
            Some(Arc::new(ArtemisBackend::new(config)?))
        }
        None => None,
    };

    let engine = Arc::new(EnsembleSearchEngine::new(db.clone(), backend.clone()));
    let anomaly = Arc::new(AnomalyDetector::new(db.clone()));

    let pipeline_config = PipelineConfig::default()
        .with_daily_cap(settings.embedding_daily_cap)
        .with_model(settings.embedding_model.clone());
    let pipeline = Arc::new(
        EmbeddingPipeline::new(db.clone(), backend.clone(), pipeline_config).start(),
    );

    let state = AppState {
        db,
        engine,
        anomaly,
        metrics: Arc::new(ApiMetrics::new()),
        limiter: Arc::new(build_limiter(settings.rate_limit_per_minute)),
        pipeline: pipeline.clone(),
        settings: Arc::new(settings.clone()),
    };

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(
        subsystem = "api",
        %addr,
        vector_available,
        embedding_enabled = backend.is_some(),
        "logr listening"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Stop the pipeline after the last request drains; the task exits
    // within one poll interval.
    pipeline.shutdown().await;
    info!(subsystem = "api", "Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!(subsystem = "api", "Shutdown signal received");
}
