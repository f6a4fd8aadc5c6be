//! In-process request metrics.
//!
//! Mutated by every request handler; all counters are atomics (or a
//! short-lived mutex for the per-status map) so concurrent tasks never
//! contend for long. Recording must never fail a request.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

/// Aggregated request counters since process start.
pub struct ApiMetrics {
    started: Instant,
    total_requests: AtomicU64,
    error_count: AtomicU64,
    latency_sum_micros: AtomicU64,
    latency_count: AtomicU64,
    status_codes: Mutex<BTreeMap<u16, u64>>,
}

/// Point-in-time snapshot for the `/metrics` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_seconds: f64,
    pub total_requests: u64,
    pub error_count: u64,
    pub error_rate: f64,
    pub avg_latency_ms: f64,
    pub status_codes: BTreeMap<u16, u64>,
}

impl ApiMetrics {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            total_requests: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            latency_sum_micros: AtomicU64::new(0),
            latency_count: AtomicU64::new(0),
            status_codes: Mutex::new(BTreeMap::new()),
        }
    }

    /// Record one completed request.
    pub fn record(&self, status: u16, latency: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_micros
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);

        if status >= 400 {
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }

        if let Ok(mut codes) = self.status_codes.lock() {
            *codes.entry(status).or_insert(0) += 1;
        }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let total = self.total_requests.load(Ordering::Relaxed);
        let errors = self.error_count.load(Ordering::Relaxed);
        let latency_sum = self.latency_sum_micros.load(Ordering::Relaxed);
        let latency_count = self.latency_count.load(Ordering::Relaxed);

        MetricsSnapshot {
            uptime_seconds: self.started.elapsed().as_secs_f64(),
            total_requests: total,
            error_count: errors,
            error_rate: if total > 0 {
                errors as f64 / total as f64
            } else {
                0.0
            },
            avg_latency_ms: if latency_count > 0 {
                latency_sum as f64 / latency_count as f64 / 1000.0
            } else {
                0.0
            },
            status_codes: self
                .status_codes
                .lock()
                .map(|codes| codes.clone())
                .unwrap_or_default(),
        }
    }

    /// Prometheus text exposition of the snapshot.
    pub fn prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let mut out = String::new();

        out.push_str("# HELP logr_requests_total Total HTTP requests handled.\n");
        out.push_str("# TYPE logr_requests_total counter\n");
        out.push_str(&format!("logr_requests_total {}\n", snapshot.total_requests));

        out.push_str("# HELP logr_errors_total Responses with status >= 400.\n");
        out.push_str("# TYPE logr_errors_total counter\n");
        out.push_str(&format!("logr_errors_total {}\n", snapshot.error_count));

        out.push_str("# HELP logr_request_latency_ms_avg Mean request latency in milliseconds.\n");
        out.push_str("# TYPE logr_request_latency_ms_avg gauge\n");
        out.push_str(&format!(
            "logr_request_latency_ms_avg {:.3}\n",
            snapshot.avg_latency_ms
        ));

        out.push_str("# HELP logr_uptime_seconds Seconds since process start.\n");
        out.push_str("# TYPE logr_uptime_seconds gauge\n");
        out.push_str(&format!("logr_uptime_seconds {:.0}\n", snapshot.uptime_seconds));

        out.push_str("# HELP logr_requests_by_status HTTP requests by status code.\n");
        out.push_str("# TYPE logr_requests_by_status counter\n");
        for (status, count) in &snapshot.status_codes {
            out.push_str(&format!(
                "logr_requests_by_status{{status=\"{status}\"}} {count}\n"
            ));
        }

        out
    }
}

impl Default for ApiMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_snapshot() {
        let metrics = ApiMetrics::new();
        metrics.record(200, Duration::from_millis(10));
        metrics.record(201, Duration::from_millis(20));
        metrics.record(500, Duration::from_millis(30));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_requests, 3);
        assert_eq!(snapshot.error_count, 1);
        assert!((snapshot.error_rate - 1.0 / 3.0).abs() < 1e-9);
        assert!((snapshot.avg_latency_ms - 20.0).abs() < 0.01);
        assert_eq!(snapshot.status_codes[&200], 1);
        assert_eq!(snapshot.status_codes[&500], 1);
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = ApiMetrics::new().snapshot();
        assert_eq!(snapshot.total_requests, 0);
        assert_eq!(snapshot.error_rate, 0.0);
        assert_eq!(snapshot.avg_latency_ms, 0.0);
    }

    #[test]
    fn test_only_4xx_5xx_count_as_errors() {
        let metrics = ApiMetrics::new();
        metrics.record(200, Duration::ZERO);
        metrics.record(301, Duration::ZERO);
        metrics.record(404, Duration::ZERO);
        metrics.record(429, Duration::ZERO);

        assert_eq!(metrics.snapshot().error_count, 2);
    }

    #[test]
    fn test_prometheus_rendering() {
        let metrics = ApiMetrics::new();
        metrics.record(200, Duration::from_millis(5));
        metrics.record(404, Duration::from_millis(5));

        let text = metrics.prometheus();
        assert!(text.contains("logr_requests_total 2"));
        assert!(text.contains("logr_errors_total 1"));
        assert!(text.contains("logr_requests_by_status{status=\"200\"} 1"));
        assert!(text.contains("logr_requests_by_status{status=\"404\"} 1"));
        assert!(text.contains("# TYPE logr_requests_total counter"));
    }

    #[test]
    fn test_concurrent_recording() {
        use std::sync::Arc;
        let metrics = Arc::new(ApiMetrics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let m = metrics.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        m.record(200, Duration::from_micros(100));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(metrics.snapshot().total_requests, 8000);
    }
}
