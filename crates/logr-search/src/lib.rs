//! # logr-search
//!
//! Ensemble search for logr: BM25, dense-vector, and heuristic signals
//! fused with Reciprocal Rank Fusion, plus period-over-period anomaly
//! detection.

pub mod anomaly;
pub mod engine;
pub mod heuristic;
pub mod rrf;

pub use anomaly::{compare_windows, AnomalyDetector};
pub use engine::{clamp_limit, pool_size, EnsembleSearchEngine};
pub use rrf::{rrf_fuse, RankedList};
