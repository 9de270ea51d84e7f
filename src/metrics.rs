//! Request-level metrics for the scoring service.
//!
//! Latencies and scores live in fixed-capacity rolling windows (oldest
//! evicted first). Request, error and per-decision counts are lifetime
//! totals and are never windowed.

use crate::types::score::Decision;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Default rolling window capacity
pub const DEFAULT_WINDOW_SIZE: usize = 1000;

/// Fixed-capacity FIFO window
#[derive(Debug, Clone)]
struct RollingWindow {
    values: VecDeque<f64>,
    capacity: usize,
}

impl RollingWindow {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn stats(&self) -> WindowStats {
        if self.values.is_empty() {
            return WindowStats::default();
        }

        let mut sorted: Vec<f64> = self.values.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);

        let count = sorted.len();
        WindowStats {
            p50: sorted[count / 2],
            p95: sorted[(count as f64 * 0.95) as usize],
            mean: sorted.iter().sum::<f64>() / count as f64,
        }
    }
}

#[derive(Debug)]
struct MetricsState {
    request_count: u64,
    error_count: u64,
    decisions: BTreeMap<Decision, u64>,
    latencies_ms: RollingWindow,
    scores: RollingWindow,
}

/// Percentiles and mean over a rolling window; all zero when empty
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    pub p50: f64,
    pub p95: f64,
    pub mean: f64,
}

/// Point-in-time view of the collector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Lifetime successful requests
    pub request_count: u64,
    /// Lifetime failed requests
    pub error_count: u64,
    /// Lifetime decision totals
    pub decisions: BTreeMap<Decision, u64>,
    /// Rolling latency stats in milliseconds
    pub latency_ms: WindowStats,
    /// Rolling fused-score stats
    pub fraud_score: WindowStats,
    /// Observations currently held in the rolling windows
    pub window_len: usize,
    pub window_size: usize,
    pub uptime_secs: f64,
    /// Requests per second since start
    pub throughput: f64,
}

/// Thread-safe metrics collector.
///
/// Every mutation happens under one lock, so a snapshot never observes a
/// request counted without its latency, or the reverse.
pub struct MetricsCollector {
    state: Mutex<MetricsState>,
    window_size: usize,
    start_time: Instant,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::with_window_size(DEFAULT_WINDOW_SIZE)
    }

    pub fn with_window_size(window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            state: Mutex::new(MetricsState {
                request_count: 0,
                error_count: 0,
                decisions: Decision::ALL.iter().map(|&d| (d, 0)).collect(),
                latencies_ms: RollingWindow::new(window_size),
                scores: RollingWindow::new(window_size),
            }),
            window_size,
            start_time: Instant::now(),
        }
    }

    /// Record a completed request
    pub fn record(&self, latency: Duration, decision: Decision, fraud_score: f64) {
        let mut state = self.state.lock();
        state.latencies_ms.push(latency.as_secs_f64() * 1000.0);
        state.scores.push(fraud_score);
        *state.decisions.entry(decision).or_insert(0) += 1;
        state.request_count += 1;
    }

    /// Record a failed request
    pub fn record_error(&self) {
        self.state.lock().error_count += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = self.state.lock();
        let uptime = self.start_time.elapsed().as_secs_f64();
        MetricsSnapshot {
            request_count: state.request_count,
            error_count: state.error_count,
            decisions: state.decisions.clone(),
            latency_ms: state.latencies_ms.stats(),
            fraud_score: state.scores.stats(),
            window_len: state.latencies_ms.len(),
            window_size: self.window_size,
            uptime_secs: uptime,
            throughput: if uptime > 0.0 {
                state.request_count as f64 / uptime
            } else {
                0.0
            },
        }
    }

    /// Log a summary of the current snapshot
    pub fn print_summary(&self) {
        let snapshot = self.snapshot();
        let total = snapshot.request_count + snapshot.error_count;
        let error_rate = if total > 0 {
            snapshot.error_count as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║              FRAUD SCORING SERVICE - METRICS SUMMARY         ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Requests Scored: {:>8}  │  Throughput: {:>6.1} req/s       ║",
            snapshot.request_count, snapshot.throughput
        );
        info!(
            "║ Errors:          {:>8}  │  Error Rate: {:>6.2}%           ║",
            snapshot.error_count, error_rate
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Latency (ms, last {}): mean={:.2} p50={:.2} p95={:.2}",
            snapshot.window_len,
            snapshot.latency_ms.mean,
            snapshot.latency_ms.p50,
            snapshot.latency_ms.p95
        );
        info!(
            "║ Fraud score (last {}): mean={:.4} p50={:.4} p95={:.4}",
            snapshot.window_len,
            snapshot.fraud_score.mean,
            snapshot.fraud_score.p50,
            snapshot.fraud_score.p95
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        for (decision, count) in &snapshot.decisions {
            let pct = if snapshot.request_count > 0 {
                *count as f64 / snapshot.request_count as f64 * 100.0
            } else {
                0.0
            };
            info!("║   {:8}: {:>8} ({:>5.1}%)", decision.as_str(), count, pct);
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodically logs a metrics summary
pub struct MetricsReporter {
    metrics: Arc<MetricsCollector>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<MetricsCollector>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs: interval_secs.max(1),
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        // first tick fires immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_empty_collector_reports_zeros() {
        let snapshot = MetricsCollector::new().snapshot();

        assert_eq!(snapshot.request_count, 0);
        assert_eq!(snapshot.error_count, 0);
        assert_eq!(snapshot.latency_ms, WindowStats::default());
        assert_eq!(snapshot.fraud_score, WindowStats::default());
        assert_eq!(snapshot.decisions.values().sum::<u64>(), 0);
        assert_eq!(snapshot.decisions.len(), 3);
    }

    #[test]
    fn test_metrics_recording() {
        let metrics = MetricsCollector::new();

        metrics.record(Duration::from_millis(10), Decision::Approve, 0.1);
        metrics.record(Duration::from_millis(20), Decision::Review, 0.5);
        metrics.record(Duration::from_millis(30), Decision::Approve, 0.2);
        metrics.record_error();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.request_count, 3);
        assert_eq!(snapshot.error_count, 1);
        assert_eq!(snapshot.decisions[&Decision::Approve], 2);
        assert_eq!(snapshot.decisions[&Decision::Review], 1);
        assert_eq!(snapshot.decisions[&Decision::Decline], 0);

        // sorted [10, 20, 30]: p50 at index 1, p95 at index 2
        assert!((snapshot.latency_ms.p50 - 20.0).abs() < 1e-9);
        assert!((snapshot.latency_ms.p95 - 30.0).abs() < 1e-9);
        assert!((snapshot.latency_ms.mean - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_percentile_indexing() {
        let metrics = MetricsCollector::new();
        for ms in 1..=100 {
            metrics.record(Duration::from_millis(ms), Decision::Approve, 0.0);
        }

        let latency = metrics.snapshot().latency_ms;
        // indices floor(0.5 * 100) = 50 and floor(0.95 * 100) = 95
        assert!((latency.p50 - 51.0).abs() < 1e-9);
        assert!((latency.p95 - 96.0).abs() < 1e-9);
        assert!(latency.p50 <= latency.p95);
    }

    #[test]
    fn test_window_evicts_oldest() {
        let metrics = MetricsCollector::with_window_size(3);

        for ms in [1000, 1000, 1000, 1, 2, 3] {
            metrics.record(Duration::from_millis(ms), Decision::Decline, 0.9);
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.window_len, 3);
        assert_eq!(snapshot.request_count, 6);
        assert_eq!(snapshot.decisions[&Decision::Decline], 6);
        assert!((snapshot.latency_ms.mean - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_errors_do_not_touch_windows() {
        let metrics = MetricsCollector::new();
        metrics.record(Duration::from_millis(5), Decision::Approve, 0.1);
        let before = metrics.snapshot();

        metrics.record_error();
        metrics.record_error();

        let after = metrics.snapshot();
        assert_eq!(after.error_count, 2);
        assert_eq!(after.request_count, before.request_count);
        assert_eq!(after.latency_ms, before.latency_ms);
        assert_eq!(after.window_len, 1);
    }

    #[test]
    fn test_concurrent_recording() {
        let metrics = Arc::new(MetricsCollector::with_window_size(100));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let metrics = metrics.clone();
                thread::spawn(move || {
                    for j in 0..250 {
                        metrics.record(Duration::from_micros(j), Decision::ALL[i % 3], 0.5);
                        if j % 50 == 0 {
                            metrics.record_error();
                        }
                        let snapshot = metrics.snapshot();
                        assert!(snapshot.latency_ms.p50 <= snapshot.latency_ms.p95);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.request_count, 2000);
        assert_eq!(snapshot.error_count, 40);
        assert_eq!(snapshot.decisions.values().sum::<u64>(), 2000);
        assert_eq!(snapshot.window_len, 100);
    }
}
