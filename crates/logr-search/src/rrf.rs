//! Reciprocal Rank Fusion (RRF) for combining retriever outputs.

use std::collections::BTreeMap;

use tracing::debug;
use uuid::Uuid;

use logr_core::{defaults, Candidate, SearchHit};

/// One retriever's ranked output, tagged with its signal name
/// ("bm25", "vector", "heuristic").
pub struct RankedList {
    pub signal: &'static str,
    pub candidates: Vec<Candidate>,
}

impl RankedList {
    pub fn new(signal: &'static str, candidates: Vec<Candidate>) -> Self {
        Self { signal, candidates }
    }
}

/// Fuse ranked lists using Reciprocal Rank Fusion.
///
/// A document at 1-based rank `r` in a list contributes `1/(k + r)`
/// to its fused score, k = 60. `similarity` is the fused score
/// normalized by the best possible score across the supplied signals
/// (rank 1 in every list), so it lands in [0, 1].
pub fn rrf_fuse(ranked_lists: Vec<RankedList>, limit: usize) -> Vec<SearchHit> {
    let num_lists = ranked_lists.len();

    struct Fused {
        candidate: Candidate,
        score: f32,
        signals: BTreeMap<String, f32>,
    }

    let mut fused: std::collections::HashMap<Uuid, Fused> = std::collections::HashMap::new();

    for list in ranked_lists {
        for (rank0, candidate) in list.candidates.into_iter().enumerate() {
            let contribution = 1.0 / (defaults::RRF_K + rank0 as f32 + 1.0);
            let entry = fused.entry(candidate.id).or_insert_with(|| Fused {
                candidate,
                score: 0.0,
                signals: BTreeMap::new(),
            });
            entry.score += contribution;
            entry.signals.insert(list.signal.to_string(), contribution);
        }
    }

    if fused.is_empty() {
        return Vec::new();
    }

    // A document ranked first in every list scores num_lists / (k + 1).
    let max_possible = num_lists as f32 / (defaults::RRF_K + 1.0);

    let mut results: Vec<SearchHit> = fused
        .into_values()
        .map(|entry| {
            let similarity = if max_possible > 0.0 {
                (entry.score / max_possible).min(1.0)
            } else {
                0.0
            };
            SearchHit {
                id: entry.candidate.id,
                service: entry.candidate.service,
                level: entry.candidate.level,
                message: entry.candidate.message,
                timestamp: entry.candidate.timestamp,
                trace_id: entry.candidate.trace_id,
                error_type: entry.candidate.error_type,
                similarity,
                signals: entry.signals,
            }
        })
        .collect();

    results.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(limit);

    debug!(
        subsystem = "search",
        component = "rrf",
        input_lists = num_lists,
        rrf_k = defaults::RRF_K,
        result_count = results.len(),
        "RRF fusion complete"
    );

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use logr_core::LogLevel;

    fn candidate(id: Uuid, score: f32) -> Candidate {
        Candidate {
            id,
            service: "taskr-bot".into(),
            level: LogLevel::Info,
            message: "msg".into(),
            timestamp: Utc::now(),
            trace_id: None,
            error_type: None,
            score,
        }
    }

    #[test]
    fn test_fuse_single_list_preserves_order() {
        let id1 = Uuid::new_v4();
        let id2 = Uuid::new_v4();
        let list = RankedList::new("bm25", vec![candidate(id1, 0.9), candidate(id2, 0.5)]);

        let results = rrf_fuse(vec![list], 10);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, id1);
        assert!(results[0].similarity > results[1].similarity);
        // Rank 1 in the only list normalizes to exactly 1.0.
        assert!((results[0].similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_fuse_contribution_values() {
        let id = Uuid::new_v4();
        let list = RankedList::new("bm25", vec![candidate(id, 1.0)]);

        let results = rrf_fuse(vec![list], 10);
        let contribution = results[0].signals["bm25"];
        assert!((contribution - 1.0 / 61.0).abs() < 1e-6);
    }

    #[test]
    fn test_fuse_sums_across_signals() {
        let shared = Uuid::new_v4();
        let only_bm25 = Uuid::new_v4();

        let bm25 = RankedList::new(
            "bm25",
            vec![candidate(only_bm25, 0.9), candidate(shared, 0.5)],
        );
        let vector = RankedList::new("vector", vec![candidate(shared, 0.8)]);

        let results = rrf_fuse(vec![bm25, vector], 10);
        // shared: 1/(60+2) + 1/(60+1) > only_bm25: 1/(60+1)
        assert_eq!(results[0].id, shared);
        assert_eq!(results[0].signals.len(), 2);
        assert!(results[0].signals.contains_key("bm25"));
        assert!(results[0].signals.contains_key("vector"));
        assert_eq!(results[1].signals.len(), 1);
    }

    #[test]
    fn test_fuse_monotonicity() {
        // A document at rank 1 in every list beats one at rank 2 in
        // every list.
        let better = Uuid::new_v4();
        let worse = Uuid::new_v4();

        let lists = vec![
            RankedList::new(
                "bm25",
                vec![candidate(better, 0.9), candidate(worse, 0.8)],
            ),
            RankedList::new(
                "vector",
                vec![candidate(better, 0.9), candidate(worse, 0.8)],
            ),
            RankedList::new(
                "heuristic",
                vec![candidate(better, 0.9), candidate(worse, 0.8)],
            ),
        ];

        let results = rrf_fuse(lists, 10);
        assert_eq!(results[0].id, better);
        assert!(results[0].similarity > results[1].similarity);
    }

    #[test]
    fn test_fuse_similarity_in_unit_range() {
        let ids: Vec<Uuid> = (0..20).map(|_| Uuid::new_v4()).collect();
        let list_a = RankedList::new(
            "bm25",
            ids.iter().map(|id| candidate(*id, 0.5)).collect(),
        );
        let list_b = RankedList::new(
            "vector",
            ids.iter().rev().map(|id| candidate(*id, 0.5)).collect(),
        );

        for hit in rrf_fuse(vec![list_a, list_b], 50) {
            assert!((0.0..=1.0).contains(&hit.similarity));
        }
    }

    #[test]
    fn test_fuse_respects_limit() {
        let list = RankedList::new(
            "bm25",
            (0..100).map(|_| candidate(Uuid::new_v4(), 0.5)).collect(),
        );
        assert_eq!(rrf_fuse(vec![list], 10).len(), 10);
    }

    #[test]
    fn test_fuse_empty() {
        assert!(rrf_fuse(vec![], 10).is_empty());
        assert!(rrf_fuse(vec![RankedList::new("bm25", vec![])], 10).is_empty());
    }
}
