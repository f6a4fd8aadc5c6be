//! # logr-pipeline
//!
//! Background embedding pipeline: a single cooperative task that polls
//! for unembedded eligible log entries, batches them through the
//! embedding provider, and writes vectors back.
//!
//! Rules enforced here:
//! - never embed rows from excluded services (loop prevention)
//! - never embed debug-level rows or short messages
//! - never re-embed a row that already has a vector
//! - never exceed the daily cap within one UTC day

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{error, info, warn};

use logr_core::{defaults, EmbeddingBackend, Error, Result};
use logr_db::Database;

/// Configuration for the embedding pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Seconds between polling cycles.
    pub poll_interval_secs: u64,
    /// Maximum embeddings generated per UTC day.
    pub daily_cap: i64,
    /// Model name written to `embedding_model` alongside each vector.
    pub model: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: defaults::PIPELINE_POLL_INTERVAL_SECS,
            daily_cap: defaults::PIPELINE_DAILY_CAP,
            model: defaults::EMBED_MODEL.to_string(),
        }
    }
}

impl PipelineConfig {
    /// Set the daily cap.
    pub fn with_daily_cap(mut self, cap: i64) -> Self {
        self.daily_cap = cap;
        self
    }

    /// Set the embedding model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// Counters owned by the pipeline task; reads from the admin endpoint
/// take the lock briefly, never across an await.
#[derive(Debug, Default)]
struct PipelineState {
    running: bool,
    daily_count: i64,
    daily_date: Option<NaiveDate>,
    total_embedded: i64,
    total_errors: i64,
    last_run: Option<chrono::DateTime<Utc>>,
}

/// Snapshot of pipeline state for introspection.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub enabled: bool,
    pub running: bool,
    pub daily_count: i64,
    pub daily_cap: i64,
    pub daily_date: Option<NaiveDate>,
    pub total_embedded: i64,
    pub total_errors: i64,
    pub last_run: Option<chrono::DateTime<Utc>>,
    pub model: String,
}

/// Handle for observing and stopping a started pipeline.
pub struct PipelineHandle {
    enabled: bool,
    config: PipelineConfig,
    state: Arc<Mutex<PipelineState>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl PipelineHandle {
    /// Snapshot the current pipeline state.
    pub fn status(&self) -> PipelineStatus {
        let state = self.state.lock().expect("pipeline state lock poisoned");
        PipelineStatus {
            enabled: self.enabled,
            running: state.running,
            daily_count: state.daily_count,
            daily_cap: self.config.daily_cap,
            daily_date: state.daily_date,
            total_embedded: state.total_embedded,
            total_errors: state.total_errors,
            last_run: state.last_run,
            model: self.config.model.clone(),
        }
    }

    /// Signal the task to stop. The current cycle is cancelled or
    /// allowed to finish; the task terminates within one poll interval.
    pub async fn shutdown(&self) {
        if let Some(tx) = &self.shutdown_tx {
            let _ = tx.send(()).await;
        }
    }
}

/// The background embedding pipeline.
pub struct EmbeddingPipeline {
    db: Database,
    backend: Option<Arc<dyn EmbeddingBackend>>,
    config: PipelineConfig,
    state: Arc<Mutex<PipelineState>>,
}

impl EmbeddingPipeline {
    /// Create a pipeline. `backend = None` (no provider key) makes the
    /// pipeline permanently disabled; `start` then spawns nothing.
    pub fn new(
        db: Database,
        backend: Option<Arc<dyn EmbeddingBackend>>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            db,
            backend,
            config,
            state: Arc::new(Mutex::new(PipelineState::default())),
        }
    }

    /// Spawn the polling task (if enabled) and return its handle.
    pub fn start(self) -> PipelineHandle {
        let enabled = self.backend.is_some();
        let config = self.config.clone();
        let state = self.state.clone();

        if !enabled {
            info!(
                subsystem = "pipeline",
                "Embedding provider key not set, pipeline disabled"
            );
            return PipelineHandle {
                enabled: false,
                config,
                state,
                shutdown_tx: None,
            };
        }

        info!(
            subsystem = "pipeline",
            poll_secs = config.poll_interval_secs,
            batch = defaults::PIPELINE_BATCH_SIZE,
            daily_cap = config.daily_cap,
            model = %config.model,
            "Embedding pipeline started"
        );

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        tokio::spawn(self.run(shutdown_rx));

        PipelineHandle {
            enabled: true,
            config,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Poll loop. Shutdown can interrupt a cycle mid-flight (including
    /// during the outbound provider call); the write-back commits once
    /// at the end of a cycle, so a cancelled cycle writes nothing.
    async fn run(self, mut shutdown_rx: mpsc::Receiver<()>) {
        self.state.lock().expect("pipeline state lock poisoned").running = true;

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                result = self.run_cycle() => {
                    if let Err(e) = result {
                        self.record_error();
                        error!(
                            subsystem = "pipeline",
                            op = "run_cycle",
                            error = %e,
                            "Embedding cycle error"
                        );
                    }
                }
            }

            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = sleep(Duration::from_secs(self.config.poll_interval_secs)) => {}
            }
        }

        self.state.lock().expect("pipeline state lock poisoned").running = false;
        info!(subsystem = "pipeline", "Embedding pipeline stopped");
    }

    /// One polling cycle: reset the daily counter on a UTC date change,
    /// respect the cap, scan for eligible rows, embed, write back once.
    async fn run_cycle(&self) -> Result<()> {
        let Some(backend) = &self.backend else {
            return Ok(());
        };

        let today = Utc::now().date_naive();
        let remaining = {
            let mut state = self.state.lock().expect("pipeline state lock poisoned");
            if state.daily_date != Some(today) {
                state.daily_count = 0;
                state.daily_date = Some(today);
            }
            self.config.daily_cap - state.daily_count
        };

        if remaining <= 0 {
            return Ok(());
        }

        let batch_limit = defaults::PIPELINE_BATCH_SIZE.min(remaining);
        let rows = self.db.embeddings.eligible_rows(batch_limit).await?;

        if rows.is_empty() {
            self.record_run();
            return Ok(());
        }

        let (ids, texts): (Vec<_>, Vec<_>) = rows.into_iter().unzip();

        let vectors = match backend.embed_texts(&texts).await {
            Ok(vectors) => vectors,
            Err(e) => {
                // No retries: the failure rolls into the next cycle.
                self.record_error();
                warn!(
                    subsystem = "pipeline",
                    op = "embed_texts",
                    input_count = texts.len(),
                    error = %e,
                    "Provider embedding request failed"
                );
                return Ok(());
            }
        };

        if vectors.len() != ids.len() {
            self.record_error();
            return Err(Error::Embedding(format!(
                "provider returned {} vectors for {} rows",
                vectors.len(),
                ids.len()
            )));
        }

        let updates: Vec<_> = ids.into_iter().zip(vectors).collect();
        let written = self
            .db
            .embeddings
            .store_embeddings(&updates, &self.config.model)
            .await?;

        {
            let mut state = self.state.lock().expect("pipeline state lock poisoned");
            state.daily_count += written as i64;
            state.total_embedded += written as i64;
            state.last_run = Some(Utc::now());
            info!(
                subsystem = "pipeline",
                op = "run_cycle",
                embedded = written,
                daily_count = state.daily_count,
                daily_cap = self.config.daily_cap,
                "Embedded batch"
            );
        }

        Ok(())
    }

    fn record_run(&self) {
        let mut state = self.state.lock().expect("pipeline state lock poisoned");
        state.last_run = Some(Utc::now());
    }

    fn record_error(&self) {
        let mut state = self.state.lock().expect("pipeline state lock poisoned");
        state.total_errors += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.poll_interval_secs, 30);
        assert_eq!(config.daily_cap, 50_000);
        assert_eq!(config.model, "text-embedding-3-small");
    }

    #[test]
    fn test_batch_limit_respects_remaining_cap() {
        // min(batch, cap - count): the last partial batch of the day
        // shrinks to the remaining budget.
        let remaining: i64 = 7;
        assert_eq!(defaults::PIPELINE_BATCH_SIZE.min(remaining), 7);
        let remaining: i64 = 10_000;
        assert_eq!(
            defaults::PIPELINE_BATCH_SIZE.min(remaining),
            defaults::PIPELINE_BATCH_SIZE
        );
    }

    #[test]
    fn test_excluded_services_cover_self_and_provider() {
        assert!(defaults::PIPELINE_EXCLUDED_SERVICES.contains(&"logr"));
        assert!(defaults::PIPELINE_EXCLUDED_SERVICES.contains(&"artemis"));
        assert!(defaults::PIPELINE_EXCLUDED_LEVELS.contains(&"debug"));
    }

    #[test]
    fn test_disabled_pipeline_status() {
        // A handle for a disabled pipeline reports enabled = false and
        // never runs; built directly since no DB is needed for this.
        let handle = PipelineHandle {
            enabled: false,
            config: PipelineConfig::default(),
            state: Arc::new(Mutex::new(PipelineState::default())),
            shutdown_tx: None,
        };
        let status = handle.status();
        assert!(!status.enabled);
        assert!(!status.running);
        assert_eq!(status.daily_count, 0);
        assert_eq!(status.daily_cap, 50_000);
    }

    #[tokio::test]
    async fn test_shutdown_without_task_is_noop() {
        let handle = PipelineHandle {
            enabled: false,
            config: PipelineConfig::default(),
            state: Arc::new(Mutex::new(PipelineState::default())),
            shutdown_tx: None,
        };
        handle.shutdown().await;
    }
}
