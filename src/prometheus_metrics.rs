use std::sync::atomic::AtomicU64;
use std::time::Duration;

use prometheus_client::{
    encoding::text::encode,
    metrics::{counter::Counter, gauge::Gauge, histogram::Histogram},
    registry::Registry,
};

use crate::metrics::ErrorType;
use crate::types::{HashrateSample, SubmitOutcome};

pub const HASHRATE_GAUGE: &str = "mining_hashrate_mhs";

#[derive(Debug)]
pub struct PrometheusMetrics {
    registry: Registry,

    // Gauges
    hashrate_mhs: Gauge<f64, AtomicU64>,

    // Counters
    batches: Counter,
    hashes: Counter,
    submissions_accepted: Counter,
    submissions_rejected: Counter,
    submission_failures: Counter,
    device_errors: Counter,
    work_fetch_errors: Counter,
    work_changes: Counter,

    // Histograms
    batch_duration_ms: Histogram,
}

impl Default for PrometheusMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PrometheusMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let hashrate_mhs = Gauge::<f64, AtomicU64>::default();

        let batches = Counter::default();
        let hashes = Counter::default();
        let submissions_accepted = Counter::default();
        let submissions_rejected = Counter::default();
        let submission_failures = Counter::default();
        let device_errors = Counter::default();
        let work_fetch_errors = Counter::default();
        let work_changes = Counter::default();

        let batch_duration_ms = Histogram::new(
            [1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0].into_iter(),
        );

        registry.register(HASHRATE_GAUGE, "Hashrate MH/s", hashrate_mhs.clone());
        registry.register("mining_batches", "Hash batches dispatched", batches.clone());
        registry.register("mining_hashes", "Candidate nonces hashed", hashes.clone());
        registry.register(
            "mining_submissions_accepted",
            "Solutions accepted by the coordinator",
            submissions_accepted.clone(),
        );
        registry.register(
            "mining_submissions_rejected",
            "Solutions rejected by the coordinator",
            submissions_rejected.clone(),
        );
        registry.register(
            "mining_submission_failures",
            "Solutions that could not be delivered",
            submission_failures.clone(),
        );
        registry.register("mining_device_errors", "Compute device failures", device_errors.clone());
        registry.register(
            "mining_work_fetch_errors",
            "Failed work fetches",
            work_fetch_errors.clone(),
        );
        registry.register(
            "mining_work_changes",
            "Work descriptors superseded by new work",
            work_changes.clone(),
        );
        registry.register(
            "mining_batch_duration_ms",
            "Wall time of one batch dispatch in milliseconds",
            batch_duration_ms.clone(),
        );

        Self {
            registry,
            hashrate_mhs,
            batches,
            hashes,
            submissions_accepted,
            submissions_rejected,
            submission_failures,
            device_errors,
            work_fetch_errors,
            work_changes,
            batch_duration_ms,
        }
    }

    pub fn record_batch(&self, hashes: u64, elapsed: Duration, sample: HashrateSample) {
        self.batches.inc();
        self.hashes.inc_by(hashes);
        self.hashrate_mhs.set(sample.megahashes());
        self.batch_duration_ms.observe(elapsed.as_secs_f64() * 1000.0);
    }

    pub fn record_submission(&self, outcome: &SubmitOutcome) {
        match outcome {
            SubmitOutcome::Accepted => self.submissions_accepted.inc(),
            SubmitOutcome::Rejected { .. } => self.submissions_rejected.inc(),
            SubmitOutcome::NetworkError(_) => self.submission_failures.inc(),
        };
    }

    pub fn record_error(&self, error_type: ErrorType) {
        match error_type {
            ErrorType::Device => self.device_errors.inc(),
            ErrorType::WorkFetch => self.work_fetch_errors.inc(),
        };
    }

    pub fn record_work_refresh(&self, superseded: bool) {
        if superseded {
            self.work_changes.inc();
        }
    }

    pub fn export_metrics(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}
