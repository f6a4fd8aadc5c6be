//! Period-over-period anomaly detection.
//!
//! Compares the last `H` hours against the `H` hours before them and
//! emits typed findings for error-rate spikes, latency spikes, and
//! never-before-seen error types.

use chrono::{Duration, Utc};

use logr_core::{defaults, AnomalyFinding, AnomalySeverity, AnomalyType, Result};
use logr_db::{Database, WindowStats};

/// Anomaly detector over the log store.
pub struct AnomalyDetector {
    db: Database,
}

impl AnomalyDetector {
    /// Create a new detector.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Compare the last `hours` hours against the preceding window,
    /// optionally scoped to one service.
    pub async fn detect(
        &self,
        service: Option<&str>,
        hours: i64,
    ) -> Result<Vec<AnomalyFinding>> {
        let now = Utc::now();
        let window = Duration::hours(hours);

        let current = self
            .db
            .stats
            .window_stats(service, now - window, now)
            .await?;
        let previous = self
            .db
            .stats
            .window_stats(service, now - window - window, now - window)
            .await?;

        Ok(compare_windows(&previous, &current))
    }
}

/// Pure comparison of two windows, producing findings.
pub fn compare_windows(previous: &WindowStats, current: &WindowStats) -> Vec<AnomalyFinding> {
    let mut findings = Vec::new();

    // Error-rate spike: the rate grew by more than 1.5x and the
    // current window has enough errors to matter.
    let previous_rate = previous.error_rate();
    let current_rate = current.error_rate();
    if current_rate > defaults::ANOMALY_SPIKE_RATIO * previous_rate
        && current.errors > defaults::ANOMALY_MIN_ERRORS
    {
        let ratio = if previous_rate > 0.0 {
            current_rate / previous_rate
        } else {
            f64::INFINITY
        };
        let severity = if ratio > defaults::ANOMALY_HIGH_RATIO {
            AnomalySeverity::High
        } else {
            AnomalySeverity::Medium
        };
        findings.push(AnomalyFinding {
            anomaly_type: AnomalyType::ErrorRateSpike,
            severity,
            message: format!(
                "Error rate rose from {:.1}% to {:.1}% ({} errors in the current window)",
                previous_rate * 100.0,
                current_rate * 100.0,
                current.errors
            ),
            previous: Some(previous_rate),
            current: Some(current_rate),
            error_types: None,
        });
    }

    // Latency spike: average duration grew by more than 1.5x.
    if let (Some(prev_latency), Some(curr_latency)) =
        (previous.avg_latency_ms, current.avg_latency_ms)
    {
        if curr_latency > defaults::ANOMALY_SPIKE_RATIO * prev_latency {
            findings.push(AnomalyFinding {
                anomaly_type: AnomalyType::LatencySpike,
                severity: AnomalySeverity::Medium,
                message: format!(
                    "Average latency rose from {prev_latency:.0}ms to {curr_latency:.0}ms"
                ),
                previous: Some(prev_latency),
                current: Some(curr_latency),
                error_types: None,
            });
        }
    }

    // New error types: anything present now that the previous window
    // never saw.
    let new_types: Vec<String> = current
        .error_types
        .iter()
        .filter(|t| !previous.error_types.contains(t))
        .cloned()
        .collect();
    if !new_types.is_empty() {
        let listed: Vec<&str> = new_types
            .iter()
            .take(defaults::ANOMALY_MAX_LISTED_ERRORS)
            .map(String::as_str)
            .collect();
        findings.push(AnomalyFinding {
            anomaly_type: AnomalyType::NewErrorTypes,
            severity: AnomalySeverity::Medium,
            message: format!("New error types appeared: {}", listed.join(", ")),
            previous: None,
            current: None,
            error_types: Some(new_types),
        });
    }

    findings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(total: i64, errors: i64, avg_latency_ms: Option<f64>, types: &[&str]) -> WindowStats {
        WindowStats {
            total,
            errors,
            avg_latency_ms,
            error_types: types.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_quiet_windows_produce_nothing() {
        let prev = window(100, 2, Some(50.0), &["Timeout"]);
        let curr = window(110, 2, Some(55.0), &["Timeout"]);
        assert!(compare_windows(&prev, &curr).is_empty());
    }

    #[test]
    fn test_error_rate_spike_high_severity() {
        // 2/102 ≈ 2% vs 20/120 ≈ 16.7%: ratio > 2x, errors > 5.
        let prev = window(102, 2, None, &[]);
        let curr = window(120, 20, None, &[]);

        let findings = compare_windows(&prev, &curr);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].anomaly_type, AnomalyType::ErrorRateSpike);
        assert_eq!(findings[0].severity, AnomalySeverity::High);
        assert!(findings[0].current.unwrap() > findings[0].previous.unwrap());
    }

    #[test]
    fn test_error_rate_spike_medium_severity() {
        // 10% -> 17%: above 1.5x but below 2x.
        let prev = window(100, 10, None, &[]);
        let curr = window(100, 17, None, &[]);

        let findings = compare_windows(&prev, &curr);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, AnomalySeverity::Medium);
    }

    #[test]
    fn test_error_rate_spike_needs_minimum_errors() {
        // Huge relative jump but only 3 errors: below the floor.
        let prev = window(1000, 0, None, &[]);
        let curr = window(1000, 3, None, &[]);
        assert!(compare_windows(&prev, &curr).is_empty());
    }

    #[test]
    fn test_error_rate_spike_from_zero_is_high() {
        let prev = window(100, 0, None, &[]);
        let curr = window(100, 10, None, &[]);

        let findings = compare_windows(&prev, &curr);
        assert_eq!(findings[0].severity, AnomalySeverity::High);
    }

    #[test]
    fn test_latency_spike() {
        let prev = window(100, 0, Some(100.0), &[]);
        let curr = window(100, 0, Some(200.0), &[]);

        let findings = compare_windows(&prev, &curr);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].anomaly_type, AnomalyType::LatencySpike);
        assert_eq!(findings[0].severity, AnomalySeverity::Medium);
    }

    #[test]
    fn test_latency_below_threshold_is_quiet() {
        let prev = window(100, 0, Some(100.0), &[]);
        let curr = window(100, 0, Some(140.0), &[]);
        assert!(compare_windows(&prev, &curr).is_empty());
    }

    #[test]
    fn test_latency_needs_both_windows() {
        let prev = window(100, 0, None, &[]);
        let curr = window(100, 0, Some(500.0), &[]);
        assert!(compare_windows(&prev, &curr).is_empty());
    }

    #[test]
    fn test_new_error_types() {
        let prev = window(100, 3, None, &["Timeout"]);
        let curr = window(100, 3, None, &["Timeout", "ConnectionReset", "OOM"]);

        let findings = compare_windows(&prev, &curr);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].anomaly_type, AnomalyType::NewErrorTypes);
        let types = findings[0].error_types.as_ref().unwrap();
        assert_eq!(types.len(), 2);
        assert!(types.contains(&"ConnectionReset".to_string()));
        assert!(types.contains(&"OOM".to_string()));
    }

    #[test]
    fn test_new_error_types_message_lists_at_most_five() {
        let prev = window(100, 0, None, &[]);
        let curr = window(
            100,
            0,
            None,
            &["E1", "E2", "E3", "E4", "E5", "E6", "E7"],
        );

        let findings = compare_windows(&prev, &curr);
        let listed = findings[0]
            .message
            .trim_start_matches("New error types appeared: ")
            .split(", ")
            .count();
        assert_eq!(listed, 5);
        // The structured field still carries all of them.
        assert_eq!(findings[0].error_types.as_ref().unwrap().len(), 7);
    }

    #[test]
    fn test_multiple_findings_at_once() {
        let prev = window(100, 2, Some(100.0), &["Timeout"]);
        let curr = window(100, 20, Some(300.0), &["Timeout", "OOM"]);

        let findings = compare_windows(&prev, &curr);
        assert_eq!(findings.len(), 3);
    }
}
