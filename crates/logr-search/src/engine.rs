//! Ensemble search engine.
//!
//! Runs the BM25, vector, and heuristic signals over the log store and
//! fuses them with RRF. Signals degrade independently: an unreachable
//! embedding provider drops the vector signal, a failed retriever is
//! omitted with a warning, and a fully dry ensemble falls back to the
//! ILIKE text scan.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use pgvector::Vector;
use tokio::time::{timeout, Duration};
use tracing::{info, warn};

use logr_core::{
    defaults, Candidate, EmbeddingBackend, Error, LogLevel, Result, SearchHit, SearchMode,
    SearchRequest, SearchResponse, SimilarRequest,
};
use logr_db::{Database, SearchFilters};

use crate::heuristic;
use crate::rrf::{rrf_fuse, RankedList};

/// Clamp a requested result limit into the supported range.
pub fn clamp_limit(limit: i64) -> i64 {
    limit.clamp(1, defaults::SEARCH_MAX_LIMIT)
}

/// Candidate pool size per retriever: `min(3 × limit, 100)`.
pub fn pool_size(limit: i64) -> i64 {
    (defaults::SEARCH_POOL_FACTOR * limit).min(defaults::SEARCH_POOL_MAX)
}

/// Ensemble search engine over the log store and an optional embedding
/// backend.
pub struct EnsembleSearchEngine {
    db: Database,
    backend: Option<Arc<dyn EmbeddingBackend>>,
}

impl EnsembleSearchEngine {
    /// Create a new engine. `backend = None` permanently disables the
    /// vector signal (searches still work lexically).
    pub fn new(db: Database, backend: Option<Arc<dyn EmbeddingBackend>>) -> Self {
        Self { db, backend }
    }

    /// Run a search request in its requested mode. Degradation ladder:
    /// vector falls back to ensemble without a query embedding, and
    /// ensemble falls back to text without any productive signal.
    pub async fn search(&self, req: &SearchRequest) -> Result<SearchResponse> {
        let start = Instant::now();
        let limit = clamp_limit(req.limit);
        let filters = build_filters(req)?;

        let response = match req.mode {
            SearchMode::Text => self.text_search(&req.query, &filters, limit).await?,
            SearchMode::Bm25 => {
                let pool = pool_size(limit);
                let candidates = self.db.search.bm25(&req.query, &filters, pool).await?;
                single_signal_response(&req.query, "bm25", candidates, limit)
            }
            SearchMode::Vector => match self.query_embedding(&req.query).await {
                Some(embedding) => {
                    let pool = pool_size(limit);
                    let candidates = self.db.search.vector(&embedding, &filters, pool).await?;
                    single_signal_response(&req.query, "vector", candidates, limit)
                }
                // No query embedding: degrade to the full ensemble.
                None => self.ensemble(&req.query, &filters, limit).await?,
            },
            SearchMode::Ensemble => self.ensemble(&req.query, &filters, limit).await?,
        };

        info!(
            subsystem = "search",
            component = "ensemble",
            op = "search",
            search_mode = response.mode.as_str(),
            result_count = response.results.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Search complete"
        );
        Ok(response)
    }

    /// Similar-log retrieval by reference entry.
    ///
    /// With an embedded reference, ranks by cosine similarity to its
    /// vector (excluding the reference itself and, optionally, its
    /// trace). Without one, falls back to an ILIKE scan on the first
    /// 50 characters of the reference message.
    pub async fn similar(&self, req: &SimilarRequest) -> Result<SearchResponse> {
        let limit = clamp_limit(req.limit);
        let reference = self.db.search.fetch_reference(req.log_id).await?;

        if let Some(embedding) = &reference.embedding {
            let exclude_trace = if req.exclude_same_trace {
                reference.trace_id.as_deref()
            } else {
                None
            };
            let candidates = self
                .db
                .search
                .similar_by_vector(embedding, reference.id, exclude_trace, limit)
                .await?;

            let results = candidates
                .into_iter()
                .map(|c| {
                    let similarity = c.score;
                    candidate_to_hit(c, similarity, "vector")
                })
                .collect();
            return Ok(SearchResponse {
                query: reference.message,
                mode: "vector".to_string(),
                signals_used: vec!["vector".to_string()],
                results,
            });
        }

        let prefix: String = reference
            .message
            .chars()
            .take(defaults::SIMILAR_FALLBACK_PREFIX)
            .collect();
        let mut response = self
            .text_search(&prefix, &SearchFilters::default(), limit + 1)
            .await?;
        response.results.retain(|hit| hit.id != reference.id);
        response.results.truncate(limit as usize);
        Ok(response)
    }

    /// Full ensemble: BM25 + vector (when available) + heuristic
    /// re-rank of their union, RRF-fused.
    async fn ensemble(
        &self,
        query: &str,
        filters: &SearchFilters,
        limit: i64,
    ) -> Result<SearchResponse> {
        let pool = pool_size(limit);
        let mut lists: Vec<RankedList> = Vec::new();

        let bm25 = match self.db.search.bm25(query, filters, pool).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(
                    subsystem = "search",
                    component = "ensemble",
                    error = %e,
                    "BM25 signal failed, omitting"
                );
                Vec::new()
            }
        };

        let vector = match self.query_embedding(query).await {
            Some(embedding) => match self.db.search.vector(&embedding, filters, pool).await {
                Ok(candidates) => candidates,
                Err(e) => {
                    warn!(
                        subsystem = "search",
                        component = "ensemble",
                        error = %e,
                        "Vector signal failed, omitting"
                    );
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        // Heuristic is not a retriever of its own: it re-ranks the
        // union of what the other signals surfaced.
        let union: Vec<Candidate> = bm25.iter().chain(vector.iter()).cloned().collect();
        let heuristic = heuristic::rank(&union, Utc::now());

        let bm25_hits = bm25.len();
        let vector_hits = vector.len();

        if !bm25.is_empty() {
            lists.push(RankedList::new("bm25", bm25));
        }
        if !vector.is_empty() {
            lists.push(RankedList::new("vector", vector));
        }
        if !heuristic.is_empty() {
            lists.push(RankedList::new("heuristic", heuristic));
        }

        if lists.is_empty() {
            // No productive signal left: degrade to the ILIKE scan.
            return self.text_search(query, filters, limit).await;
        }

        let signals_used: Vec<String> = lists.iter().map(|l| l.signal.to_string()).collect();
        let results = rrf_fuse(lists, limit as usize);

        info!(
            subsystem = "search",
            component = "ensemble",
            op = "fuse",
            bm25_hits,
            vector_hits,
            result_count = results.len(),
            "Fused ensemble signals"
        );

        Ok(SearchResponse {
            query: query.to_string(),
            mode: "ensemble".to_string(),
            signals_used,
            results,
        })
    }

    /// ILIKE fallback, ranked by recency and normalized through RRF so
    /// the response shape matches the other modes.
    async fn text_search(
        &self,
        query: &str,
        filters: &SearchFilters,
        limit: i64,
    ) -> Result<SearchResponse> {
        let candidates = self.db.search.text(query, filters, limit).await?;
        Ok(single_signal_response(query, "text", candidates, limit))
    }

    /// Query embedding with the 30 s provider timeout; any failure is
    /// mapped to `None` so the vector signal is simply omitted.
    async fn query_embedding(&self, query: &str) -> Option<Vector> {
        let backend = self.backend.as_ref()?;
        let deadline = Duration::from_secs(defaults::EMBED_QUERY_TIMEOUT_SECS);

        match timeout(deadline, backend.embed_query(query)).await {
            Ok(Ok(vector)) => Some(vector),
            Ok(Err(e)) => {
                warn!(
                    subsystem = "search",
                    component = "ensemble",
                    error = %e,
                    "Query embedding failed, vector signal omitted"
                );
                None
            }
            Err(_) => {
                warn!(
                    subsystem = "search",
                    component = "ensemble",
                    timeout_secs = defaults::EMBED_QUERY_TIMEOUT_SECS,
                    "Query embedding timed out, vector signal omitted"
                );
                None
            }
        }
    }
}

/// Parse the request's optional level filter and assemble the shared
/// retrieval filters.
fn build_filters(req: &SearchRequest) -> Result<SearchFilters> {
    let level = match &req.level {
        Some(raw) => Some(raw.parse::<LogLevel>().map_err(|_| {
            Error::Validation(format!("invalid log level filter: {raw}"))
        })?),
        None => None,
    };
    Ok(SearchFilters {
        service: req.service.clone(),
        level,
        since: req.since,
    })
}

fn single_signal_response(
    query: &str,
    signal: &'static str,
    candidates: Vec<Candidate>,
    limit: i64,
) -> SearchResponse {
    let results = rrf_fuse(vec![RankedList::new(signal, candidates)], limit as usize);
    let signals_used = if results.is_empty() {
        Vec::new()
    } else {
        vec![signal.to_string()]
    };
    SearchResponse {
        query: query.to_string(),
        mode: signal.to_string(),
        signals_used,
        results,
    }
}

fn candidate_to_hit(candidate: Candidate, similarity: f32, signal: &str) -> SearchHit {
    let mut signals = std::collections::BTreeMap::new();
    signals.insert(signal.to_string(), similarity);
    SearchHit {
        id: candidate.id,
        service: candidate.service,
        level: candidate.level,
        message: candidate.message,
        timestamp: candidate.timestamp,
        trace_id: candidate.trace_id,
        error_type: candidate.error_type,
        similarity,
        signals,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(0), 1);
        assert_eq!(clamp_limit(-5), 1);
        assert_eq!(clamp_limit(10), 10);
        assert_eq!(clamp_limit(10_000), defaults::SEARCH_MAX_LIMIT);
    }

    #[test]
    fn test_pool_size() {
        assert_eq!(pool_size(10), 30);
        assert_eq!(pool_size(5), 15);
        // Capped at 100 regardless of limit.
        assert_eq!(pool_size(50), 100);
    }

    #[test]
    fn test_build_filters_parses_level() {
        let req = SearchRequest {
            query: "q".into(),
            mode: SearchMode::Ensemble,
            service: Some("taskr-bot".into()),
            level: Some("WARNING".into()),
            since: None,
            limit: 10,
        };
        let filters = build_filters(&req).unwrap();
        assert_eq!(filters.level, Some(LogLevel::Warn));
        assert_eq!(filters.service.as_deref(), Some("taskr-bot"));
    }

    #[test]
    fn test_build_filters_rejects_bad_level() {
        let req = SearchRequest {
            query: "q".into(),
            mode: SearchMode::Ensemble,
            service: None,
            level: Some("banana".into()),
            since: None,
            limit: 10,
        };
        assert!(build_filters(&req).is_err());
    }
}
