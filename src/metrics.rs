use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::prometheus_metrics::PrometheusMetrics;
use crate::types::{HashrateSample, SubmitOutcome};

/// Where the mining loop pushes its samples and counters.
pub trait MetricsSink: Send + Sync {
    fn record_batch(&self, hashes: u64, elapsed: Duration, sample: HashrateSample);
    fn record_submission(&self, outcome: &SubmitOutcome);
    fn record_error(&self, error_type: ErrorType);
    fn record_work_refresh(&self, superseded: bool);
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metrics {
    // Throughput
    pub batches: u64,
    pub hashes: u64,
    pub hashrate_mhs: f64,

    // Solutions
    pub submissions_accepted: u64,
    pub submissions_rejected: u64,
    pub submission_failures: u64,

    // Errors
    pub device_errors: u64,
    pub work_fetch_errors: u64,

    // Work
    pub work_refreshes: u64,
    pub work_changes: u64,

    // Health
    pub uptime_seconds: u64,
    pub last_solution_seconds: Option<u64>,
    pub consecutive_fetch_failures: u32,
    pub consecutive_device_failures: u32,
}

#[derive(Debug)]
pub struct MetricsCollector {
    batches: AtomicU64,
    hashes: AtomicU64,
    hashrate_bits: AtomicU64,
    submissions_accepted: AtomicU64,
    submissions_rejected: AtomicU64,
    submission_failures: AtomicU64,
    device_errors: AtomicU64,
    work_fetch_errors: AtomicU64,
    work_refreshes: AtomicU64,
    work_changes: AtomicU64,
    consecutive_fetch_failures: AtomicU32,
    consecutive_device_failures: AtomicU32,

    start_time: Instant,
    last_solution_time: Mutex<Option<Instant>>,

    prometheus: Option<PrometheusMetrics>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(None)
    }
}

impl MetricsCollector {
    pub fn new(prometheus: Option<PrometheusMetrics>) -> Self {
        Self {
            batches: AtomicU64::new(0),
            hashes: AtomicU64::new(0),
            hashrate_bits: AtomicU64::new(0f64.to_bits()),
            submissions_accepted: AtomicU64::new(0),
            submissions_rejected: AtomicU64::new(0),
            submission_failures: AtomicU64::new(0),
            device_errors: AtomicU64::new(0),
            work_fetch_errors: AtomicU64::new(0),
            work_refreshes: AtomicU64::new(0),
            work_changes: AtomicU64::new(0),
            consecutive_fetch_failures: AtomicU32::new(0),
            consecutive_device_failures: AtomicU32::new(0),
            start_time: Instant::now(),
            last_solution_time: Mutex::new(None),
            prometheus,
        }
    }

    pub fn prometheus(&self) -> Option<&PrometheusMetrics> {
        self.prometheus.as_ref()
    }

    pub fn get_metrics(&self) -> Metrics {
        let last_solution_seconds = self
            .last_solution_time
            .lock()
            .ok()
            .and_then(|t| t.map(|t| t.duration_since(self.start_time).as_secs()));

        Metrics {
            batches: self.batches.load(Ordering::Relaxed),
            hashes: self.hashes.load(Ordering::Relaxed),
            hashrate_mhs: f64::from_bits(self.hashrate_bits.load(Ordering::Relaxed)),
            submissions_accepted: self.submissions_accepted.load(Ordering::Relaxed),
            submissions_rejected: self.submissions_rejected.load(Ordering::Relaxed),
            submission_failures: self.submission_failures.load(Ordering::Relaxed),
            device_errors: self.device_errors.load(Ordering::Relaxed),
            work_fetch_errors: self.work_fetch_errors.load(Ordering::Relaxed),
            work_refreshes: self.work_refreshes.load(Ordering::Relaxed),
            work_changes: self.work_changes.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            last_solution_seconds,
            consecutive_fetch_failures: self.consecutive_fetch_failures.load(Ordering::Relaxed),
            consecutive_device_failures: self.consecutive_device_failures.load(Ordering::Relaxed),
        }
    }

    pub fn get_health_status(&self) -> HealthStatus {
        let fetch_failures = self.consecutive_fetch_failures.load(Ordering::Relaxed);
        let device_failures = self.consecutive_device_failures.load(Ordering::Relaxed);

        if device_failures >= 2 {
            HealthStatus::Critical
        } else if fetch_failures >= 5 {
            HealthStatus::Unhealthy
        } else if fetch_failures >= 2 || device_failures >= 1 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

impl MetricsSink for MetricsCollector {
    fn record_batch(&self, hashes: u64, elapsed: Duration, sample: HashrateSample) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.hashes.fetch_add(hashes, Ordering::Relaxed);
        self.hashrate_bits.store(sample.megahashes().to_bits(), Ordering::Relaxed);
        self.consecutive_device_failures.store(0, Ordering::Relaxed);
        if let Some(p) = &self.prometheus {
            p.record_batch(hashes, elapsed, sample);
        }
    }

    fn record_submission(&self, outcome: &SubmitOutcome) {
        match outcome {
            SubmitOutcome::Accepted => {
                self.submissions_accepted.fetch_add(1, Ordering::Relaxed);
                if let Ok(mut last) = self.last_solution_time.lock() {
                    *last = Some(Instant::now());
                }
            }
            SubmitOutcome::Rejected { .. } => {
                self.submissions_rejected.fetch_add(1, Ordering::Relaxed);
            }
            SubmitOutcome::NetworkError(_) => {
                self.submission_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
        if let Some(p) = &self.prometheus {
            p.record_submission(outcome);
        }
    }

    fn record_error(&self, error_type: ErrorType) {
        match error_type {
            ErrorType::Device => {
                self.device_errors.fetch_add(1, Ordering::Relaxed);
                self.consecutive_device_failures.fetch_add(1, Ordering::Relaxed);
            }
            ErrorType::WorkFetch => {
                self.work_fetch_errors.fetch_add(1, Ordering::Relaxed);
                self.consecutive_fetch_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
        if let Some(p) = &self.prometheus {
            p.record_error(error_type);
        }
    }

    fn record_work_refresh(&self, superseded: bool) {
        self.work_refreshes.fetch_add(1, Ordering::Relaxed);
        if superseded {
            self.work_changes.fetch_add(1, Ordering::Relaxed);
        }
        self.consecutive_fetch_failures.store(0, Ordering::Relaxed);
        if let Some(p) = &self.prometheus {
            p.record_work_refresh(superseded);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    Device,
    WorkFetch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Critical,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
            HealthStatus::Critical => write!(f, "critical"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batches_update_hashrate_and_totals() {
        let m = MetricsCollector::default();
        m.record_batch(256, Duration::from_millis(100), HashrateSample { hashes_per_sec: 2_560.0 });
        let fast = HashrateSample { hashes_per_sec: 3_000_000.0 };
        m.record_batch(256, Duration::from_millis(50), fast);
        let s = m.get_metrics();
        assert_eq!(s.batches, 2);
        assert_eq!(s.hashes, 512);
        assert!((s.hashrate_mhs - 3.0).abs() < 1e-9);
    }

    #[test]
    fn submissions_are_counted_by_outcome() {
        let m = MetricsCollector::default();
        m.record_submission(&SubmitOutcome::Accepted);
        m.record_submission(&SubmitOutcome::Rejected { status: 400, body: String::new() });
        m.record_submission(&SubmitOutcome::NetworkError("refused".into()));
        let s = m.get_metrics();
        assert_eq!(
            (s.submissions_accepted, s.submissions_rejected, s.submission_failures),
            (1, 1, 1)
        );
        assert!(s.last_solution_seconds.is_some());
    }

    #[test]
    fn health_tracks_consecutive_failures() {
        let m = MetricsCollector::default();
        assert_eq!(m.get_health_status(), HealthStatus::Healthy);
        m.record_error(ErrorType::WorkFetch);
        m.record_error(ErrorType::WorkFetch);
        assert_eq!(m.get_health_status(), HealthStatus::Degraded);
        m.record_work_refresh(false);
        assert_eq!(m.get_health_status(), HealthStatus::Healthy);
        m.record_error(ErrorType::Device);
        m.record_error(ErrorType::Device);
        assert_eq!(m.get_health_status(), HealthStatus::Critical);
        m.record_batch(1, Duration::from_millis(1), HashrateSample { hashes_per_sec: 1.0 });
        assert_eq!(m.get_health_status(), HealthStatus::Healthy);
    }
}
