use std::time::Duration;

use thiserror::Error;

/// Fatal class: device, context, program or dispatch failures.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("No compute device available: {0}")]
    Unavailable(String),
    #[error("Device context error: {0}")]
    Context(String),
    #[error("Kernel program build failed: {0}")]
    Program(String),
    #[error("Kernel dispatch failed: {0}")]
    Dispatch(String),
    #[error("Hash computation failed: {0}")]
    Compute(String),
    #[error("Input template is empty")]
    EmptyTemplate,
    #[error("Input template of {len} bytes exceeds device buffer of {capacity} bytes")]
    TemplateTooLarge { len: usize, capacity: usize },
    #[error("Backend returned {got} results for a batch of {expected}")]
    MalformedBatch { expected: usize, got: usize },
}

#[cfg(feature = "opencl")]
impl From<ocl::Error> for DeviceError {
    fn from(err: ocl::Error) -> Self {
        DeviceError::Dispatch(err.to_string())
    }
}

/// Recoverable: the previous work descriptor stays current.
#[derive(Error, Debug)]
pub enum WorkFetchError {
    #[error("Work request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Coordinator answered with status {0}")]
    Status(u16),
    #[error("Malformed work body: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid target: {0}")]
    InvalidTarget(String),
    #[error("Work field '{0}' is empty")]
    EmptyField(&'static str),
    #[error("Work template of {len} bytes exceeds the {max} byte limit")]
    TemplateTooLarge { len: usize, max: usize },
}

/// Advisory: logged and counted, never interrupts mining.
#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("Submit request failed: {0}")]
    Network(#[from] reqwest::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
    #[error("No compute device of any kind is available: {0}")]
    NoDevice(String),
}

/// Errors that leave the mining loop and end the process.
#[derive(Error, Debug)]
pub enum MinerError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("Nonce space exhausted at {0}")]
    NonceSpaceExhausted(u64),
    #[error("Mining started without work")]
    NoWork,
    #[error("Hash task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for MinerError {
    fn from(e: tokio::task::JoinError) -> Self {
        MinerError::Task(e.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_retry_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
            backoff_multiplier: 2.0,
            max_retry_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Delay before re-initialization `attempt` (0-based), exponential and capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt as i32);
        Duration::from_secs_f64(
            (self.retry_delay.as_secs_f64() * factor).min(self.max_retry_delay.as_secs_f64()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let cfg = RetryConfig {
            max_retries: 5,
            retry_delay: Duration::from_millis(125),
            backoff_multiplier: 2.0,
            max_retry_delay: Duration::from_millis(375),
        };
        assert_eq!(cfg.delay_for(0), Duration::from_millis(125));
        assert_eq!(cfg.delay_for(1), Duration::from_millis(250));
        assert_eq!(cfg.delay_for(2), Duration::from_millis(375));
        assert_eq!(cfg.delay_for(9), Duration::from_millis(375));
    }

    #[test]
    fn zero_delay_stays_zero() {
        let cfg = RetryConfig { retry_delay: Duration::ZERO, ..RetryConfig::default() };
        assert_eq!(cfg.delay_for(3), Duration::ZERO);
    }

    #[test]
    fn device_error_surfaces_through_miner_error() {
        let e: MinerError = DeviceError::Dispatch("CL_OUT_OF_RESOURCES".into()).into();
        assert!(e.to_string().contains("CL_OUT_OF_RESOURCES"));
    }
}
