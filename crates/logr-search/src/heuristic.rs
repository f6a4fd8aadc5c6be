//! Heuristic re-ranker: severity × recency.
//!
//! Not a standalone retriever — it re-orders the union of candidates
//! the other signals emitted, so fusion gets a third opinion that
//! favors severe and recent entries.

use chrono::{DateTime, Utc};

use logr_core::{defaults, Candidate, LogLevel};

/// Severity component of the heuristic score.
pub fn level_weight(level: LogLevel) -> f32 {
    match level {
        LogLevel::Fatal => 1.0,
        LogLevel::Error => 0.85,
        LogLevel::Warn => 0.5,
        LogLevel::Info => 0.3,
        LogLevel::Debug => 0.1,
    }
}

/// Recency component: exponential decay with a 24-hour half-life.
/// Future timestamps clamp to full weight.
pub fn recency_weight(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> f32 {
    let age_hours = (now - timestamp).num_seconds().max(0) as f64 / 3600.0;
    2f64.powf(-age_hours / defaults::HEURISTIC_RECENCY_HALF_LIFE_HOURS) as f32
}

/// Combined heuristic score for one candidate.
pub fn heuristic_score(candidate: &Candidate, now: DateTime<Utc>) -> f32 {
    defaults::HEURISTIC_LEVEL_WEIGHT * level_weight(candidate.level)
        + defaults::HEURISTIC_RECENCY_WEIGHT * recency_weight(candidate.timestamp, now)
}

/// Re-rank a candidate union by heuristic score, descending.
///
/// Input duplicates (same id from multiple signals) are collapsed,
/// keeping the first occurrence.
pub fn rank(candidates: &[Candidate], now: DateTime<Utc>) -> Vec<Candidate> {
    let mut seen = std::collections::HashSet::new();
    let mut ranked: Vec<Candidate> = candidates
        .iter()
        .filter(|c| seen.insert(c.id))
        .map(|c| {
            let mut scored = c.clone();
            scored.score = heuristic_score(c, now);
            scored
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn candidate(level: LogLevel, age_hours: i64, now: DateTime<Utc>) -> Candidate {
        Candidate {
            id: Uuid::new_v4(),
            service: "taskr-bot".into(),
            level,
            message: "msg".into(),
            timestamp: now - Duration::hours(age_hours),
            trace_id: None,
            error_type: None,
            score: 0.0,
        }
    }

    #[test]
    fn test_level_weights_match_severity_order() {
        assert_eq!(level_weight(LogLevel::Fatal), 1.0);
        assert_eq!(level_weight(LogLevel::Error), 0.85);
        assert_eq!(level_weight(LogLevel::Warn), 0.5);
        assert_eq!(level_weight(LogLevel::Info), 0.3);
        assert_eq!(level_weight(LogLevel::Debug), 0.1);
    }

    #[test]
    fn test_recency_half_life() {
        let now = Utc::now();
        assert!((recency_weight(now, now) - 1.0).abs() < 1e-6);
        let day_old = recency_weight(now - Duration::hours(24), now);
        assert!((day_old - 0.5).abs() < 1e-3);
        let two_days = recency_weight(now - Duration::hours(48), now);
        assert!((two_days - 0.25).abs() < 1e-3);
    }

    #[test]
    fn test_future_timestamp_clamps() {
        let now = Utc::now();
        let future = recency_weight(now + Duration::hours(5), now);
        assert!((future - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_score_blend() {
        let now = Utc::now();
        let fresh_fatal = candidate(LogLevel::Fatal, 0, now);
        // 0.6 * 1.0 + 0.4 * 1.0 = 1.0
        assert!((heuristic_score(&fresh_fatal, now) - 1.0).abs() < 1e-6);

        let old_debug = candidate(LogLevel::Debug, 240, now);
        // Severity floor dominates once recency has decayed away.
        let score = heuristic_score(&old_debug, now);
        assert!(score > 0.05 && score < 0.1);
    }

    #[test]
    fn test_rank_prefers_severe_and_recent() {
        let now = Utc::now();
        let fatal_old = candidate(LogLevel::Fatal, 48, now);
        let info_fresh = candidate(LogLevel::Info, 0, now);
        let error_fresh = candidate(LogLevel::Error, 1, now);

        let ranked = rank(
            &[fatal_old.clone(), info_fresh.clone(), error_fresh.clone()],
            now,
        );
        assert_eq!(ranked[0].id, error_fresh.id);
        // fatal_old: 0.6 + 0.4*0.25 = 0.7; info_fresh: 0.18 + 0.4 = 0.58
        assert_eq!(ranked[1].id, fatal_old.id);
        assert_eq!(ranked[2].id, info_fresh.id);
    }

    #[test]
    fn test_rank_collapses_duplicates() {
        let now = Utc::now();
        let c = candidate(LogLevel::Info, 0, now);
        let ranked = rank(&[c.clone(), c.clone()], now);
        assert_eq!(ranked.len(), 1);
    }

    #[test]
    fn test_unknown_level_default_documented() {
        // The closed LogLevel set means every level has an explicit
        // weight; the 0.3 default for unknown inputs is enforced at
        // parse time (unknown levels never persist).
        assert_eq!(level_weight(LogLevel::Info), 0.3);
    }
}
