//! The mining loop.
//!
//! One control task drives `Idle → Mining → Evaluating → (Submitting) →
//! Refreshing → Mining …` and owns the nonce counter. Device parallelism
//! lives entirely inside one `compute_batch` call, which runs on the blocking
//! pool while this task waits. At most one dispatch, one work fetch or one
//! submission is in flight at any time.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backend::{check_batch, BackendFactory, HashBackend};
use crate::config::Config;
use crate::error_handling::{DeviceError, MinerError, RetryConfig, WorkFetchError};
use crate::metrics::{ErrorType, MetricsSink};
use crate::submit::Submitter;
use crate::types::{
    HashResult, HashrateSample, InputTemplate, SubmitOutcome, Submission, WorkDescriptor,
};
use crate::work::WorkSource;

/// Seeds stay below this so `seed + batch` cannot wrap within an epoch.
const NONCE_SEED_CEILING: u64 = u64::MAX / 2;

#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub wallet_id: String,
    pub throttle: Duration,
    pub epoch_interval: Duration,
    pub retry: RetryConfig,
    pub fetch_retry_delay: Duration,
}

impl LoopSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            wallet_id: config.wallet_id.clone(),
            throttle: config.get_throttle(),
            epoch_interval: config.get_epoch_interval(),
            retry: config.retry_config(),
            fetch_retry_delay: config.get_retry_delay(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinerState {
    Idle,
    Mining,
    Evaluating,
    Submitting,
    Refreshing,
    Stopped,
}

/// What one pass through the state machine did.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub work_id: String,
    pub start_nonce: u64,
    pub hashes: usize,
    pub solution: Option<HashResult>,
    pub outcome: Option<SubmitOutcome>,
    pub refreshed: bool,
    pub superseded: bool,
    /// Wall time of the successful dispatch only.
    pub elapsed: Duration,
    pub hashrate: HashrateSample,
}

pub struct MiningLoop {
    settings: LoopSettings,
    backend: Option<Box<dyn HashBackend>>,
    factory: BackendFactory,
    work_source: Box<dyn WorkSource>,
    submitter: Box<dyn Submitter>,
    metrics: Arc<dyn MetricsSink>,

    state: MinerState,
    work: Option<WorkDescriptor>,
    template: Arc<InputTemplate>,
    nonce: u64,
    epoch_started: Instant,
}

fn fresh_seed() -> u64 {
    rand::thread_rng().gen_range(0..NONCE_SEED_CEILING)
}

impl MiningLoop {
    pub fn new(
        settings: LoopSettings,
        backend: Box<dyn HashBackend>,
        factory: BackendFactory,
        work_source: Box<dyn WorkSource>,
        submitter: Box<dyn Submitter>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            settings,
            backend: Some(backend),
            factory,
            work_source,
            submitter,
            metrics,
            state: MinerState::Idle,
            work: None,
            template: Arc::new(InputTemplate::from_bytes(Vec::new())),
            nonce: 0,
            epoch_started: Instant::now(),
        }
    }

    pub fn state(&self) -> MinerState {
        self.state
    }

    pub fn current_work(&self) -> Option<&WorkDescriptor> {
        self.work.as_ref()
    }

    /// Next nonce to be dispatched.
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    fn transition(&mut self, next: MinerState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, nonce = self.nonce, "State transition");
            self.state = next;
        }
    }

    /// Fetches work and builds its template; oversized work is refused here
    /// so it never reaches a device.
    async fn fetch_work(&mut self) -> Result<(WorkDescriptor, InputTemplate), WorkFetchError> {
        let work = self.work_source.fetch().await?;
        let template = InputTemplate::for_work(&work, &self.settings.wallet_id)?;
        Ok((work, template))
    }

    fn install_work(&mut self, work: WorkDescriptor, template: InputTemplate) {
        self.template = Arc::new(template);
        self.nonce = fresh_seed();
        self.epoch_started = Instant::now();
        info!(
            work_id = %work.work_id,
            anchor = %work.anchor_hash,
            target = %work.target,
            nonce = self.nonce,
            "New work epoch"
        );
        self.work = Some(work);
    }

    /// Initial fetch, retried until it succeeds. Returns `false` if shutdown
    /// was requested first.
    pub async fn start(&mut self, shutdown: &CancellationToken) -> bool {
        loop {
            match self.fetch_work().await {
                Ok((work, template)) => {
                    self.metrics.record_work_refresh(true);
                    self.install_work(work, template);
                    self.transition(MinerState::Mining);
                    return true;
                }
                Err(e) => {
                    warn!(error = %e, "Initial work fetch failed, retrying");
                    self.metrics.record_error(ErrorType::WorkFetch);
                }
            }
            tokio::select! {
                _ = shutdown.cancelled() => return false,
                _ = tokio::time::sleep(self.settings.fetch_retry_delay) => {}
            }
        }
    }

    /// Runs until cancelled or until the device cannot be recovered.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<(), MinerError> {
        if self.work.is_none() && !self.start(&shutdown).await {
            self.transition(MinerState::Stopped);
            return Ok(());
        }

        while !shutdown.is_cancelled() {
            if let Err(e) = self.step().await {
                self.transition(MinerState::Stopped);
                error!(error = %e, nonce = self.nonce, "Mining stopped on fatal error");
                return Err(e);
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.settings.throttle) => {}
            }
        }

        self.transition(MinerState::Stopped);
        info!(nonce = self.nonce, "Mining loop stopped");
        Ok(())
    }

    /// One batch: compute, evaluate, maybe submit, then refresh if due.
    pub async fn step(&mut self) -> Result<StepReport, MinerError> {
        let work = self.work.clone().ok_or(MinerError::NoWork)?;

        self.transition(MinerState::Mining);
        let start = self.nonce;
        let batch = self.batch_size()?;
        let next = start
            .checked_add(batch as u64)
            .ok_or(MinerError::NonceSpaceExhausted(start))?;

        let (results, elapsed) = self.compute_with_recovery(&work, start).await?;
        self.nonce = next;

        self.transition(MinerState::Evaluating);
        // Results are in nonce order, so the first hit is the lowest nonce.
        let solution = results.iter().find(|r| work.target.is_met_by(&r.digest)).copied();

        let outcome = match solution {
            Some(found) => Some(self.submit(&work, &found).await),
            None => None,
        };

        self.transition(MinerState::Refreshing);
        let hashrate = HashrateSample::from_batch(results.len(), elapsed.as_secs_f64());
        self.metrics.record_batch(results.len() as u64, elapsed, hashrate);
        debug!(
            work_id = %work.work_id,
            start_nonce = start,
            mhs = hashrate.megahashes(),
            "Batch done"
        );

        let due =
            solution.is_some() || self.epoch_started.elapsed() >= self.settings.epoch_interval;
        let (refreshed, superseded) = if due { self.refresh().await } else { (false, false) };
        self.transition(MinerState::Mining);

        Ok(StepReport {
            work_id: work.work_id,
            start_nonce: start,
            hashes: results.len(),
            solution,
            outcome,
            refreshed,
            superseded,
            elapsed,
            hashrate,
        })
    }

    fn batch_size(&mut self) -> Result<usize, MinerError> {
        if self.backend.is_none() {
            let backend = (self.factory)()?;
            info!(device = backend.device_name(), "Compute device opened");
            self.backend = Some(backend);
        }
        Ok(self.backend.as_ref().map_or(0, |b| b.batch_size()))
    }

    async fn submit(&mut self, work: &WorkDescriptor, found: &HashResult) -> SubmitOutcome {
        self.transition(MinerState::Submitting);
        let submission = Submission::new(&self.settings.wallet_id, &work.work_id, found);
        info!(
            nonce = found.nonce,
            work_id = %work.work_id,
            hash = %submission.hash,
            "Qualifying hash found, submitting"
        );

        let outcome = self.submitter.submit(&submission).await;
        match &outcome {
            SubmitOutcome::Accepted => {
                info!(nonce = found.nonce, work_id = %work.work_id, "Submission accepted")
            }
            SubmitOutcome::Rejected { status, body } => warn!(
                nonce = found.nonce,
                work_id = %work.work_id,
                status,
                body = %body,
                "Submission rejected"
            ),
            SubmitOutcome::NetworkError(e) => warn!(
                nonce = found.nonce,
                work_id = %work.work_id,
                error = %e,
                "Submission not delivered"
            ),
        }
        self.metrics.record_submission(&outcome);
        outcome
    }

    /// Returns `(fetched, superseded)`.
    async fn refresh(&mut self) -> (bool, bool) {
        match self.fetch_work().await {
            Ok((fresh, template)) => {
                let superseded = self.work.as_ref().is_none_or(|w| w.work_id != fresh.work_id);
                self.metrics.record_work_refresh(superseded);
                if superseded {
                    self.install_work(fresh, template);
                } else {
                    self.epoch_started = Instant::now();
                    debug!(work_id = %fresh.work_id, nonce = self.nonce, "Work unchanged");
                }
                (true, superseded)
            }
            Err(e) => {
                warn!(
                    error = %e,
                    work_id = self.work.as_ref().map(|w| w.work_id.as_str()).unwrap_or(""),
                    nonce = self.nonce,
                    "Work fetch failed, keeping current work"
                );
                self.metrics.record_error(ErrorType::WorkFetch);
                self.epoch_started = Instant::now();
                (false, false)
            }
        }
    }

    /// Dispatches one batch, re-initializing the device on failure up to
    /// `retry.max_retries` times before giving up. Returns the results with
    /// the time of the dispatch that produced them.
    async fn compute_with_recovery(
        &mut self,
        work: &WorkDescriptor,
        start: u64,
    ) -> Result<(Vec<HashResult>, Duration), MinerError> {
        let mut reinits = 0u32;
        loop {
            let attempt = match self.backend.take() {
                Some(backend) => self.dispatch(backend, start).await?,
                None => match (self.factory)() {
                    Ok(backend) => {
                        info!(device = backend.device_name(), "Compute device re-initialized");
                        self.dispatch(backend, start).await?
                    }
                    Err(e) => Err(e),
                },
            };

            let err = match attempt {
                Ok(timed) => return Ok(timed),
                Err(e) => e,
            };
            error!(nonce = start, work_id = %work.work_id, error = %err, "Batch failed");
            self.metrics.record_error(ErrorType::Device);

            let max = self.settings.retry.max_retries;
            if reinits >= max {
                self.transition(MinerState::Stopped);
                error!(
                    nonce = start,
                    work_id = %work.work_id,
                    retries = max,
                    "Compute device unrecoverable"
                );
                return Err(err.into());
            }
            let delay = self.settings.retry.delay_for(reinits);
            reinits += 1;
            warn!(
                attempt = reinits,
                max,
                delay_ms = delay.as_millis() as u64,
                "Re-initializing compute device"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Runs `compute_batch` on the blocking pool. A failed backend is dropped,
    /// releasing its device; a healthy one goes back into `self.backend`.
    async fn dispatch(
        &mut self,
        backend: Box<dyn HashBackend>,
        start: u64,
    ) -> Result<Result<(Vec<HashResult>, Duration), DeviceError>, MinerError> {
        let template = Arc::clone(&self.template);
        let t0 = tokio::time::Instant::now();
        let (backend, result) = tokio::task::spawn_blocking(move || {
            let mut backend = backend;
            let result = backend.compute_batch(&template, start);
            (backend, result)
        })
        .await?;
        let elapsed = t0.elapsed();

        let checked = result
            .and_then(|r| check_batch(&r, start, backend.batch_size()).map(|_| (r, elapsed)));
        if checked.is_ok() {
            self.backend = Some(backend);
        } else {
            warn!(device = backend.device_name(), "Releasing failed compute device");
        }
        Ok(checked)
    }
}
