use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error_handling::{ConfigError, RetryConfig};
use crate::types::{DevicePreference, HashAlgorithm, Mode};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Work and submission
    pub mode: Mode,
    pub coordinator_url: String,
    pub work_path: String,
    pub submit_path: String,
    pub wallet_id: String,
    pub dry_run: bool,
    pub http_timeout_ms: u64,

    // Compute
    pub device_preference: DevicePreference,
    pub hash_algorithm: HashAlgorithm,
    pub batch_size: usize,
    pub cpu_threads: Option<usize>,

    // Loop pacing
    pub throttle_ms: u64,
    pub epoch_interval_ms: u64,

    // Error handling and recovery
    pub max_device_retries: u32,
    pub retry_delay_ms: u64,

    // Monitoring and logging
    pub metrics_enabled: bool,
    pub metrics_port: u16,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::Remote,
            coordinator_url: "http://127.0.0.1:4001".to_string(),
            work_path: "/work".to_string(),
            submit_path: "/submit_block".to_string(),
            wallet_id: "LocalWallet123".to_string(),
            dry_run: false,
            http_timeout_ms: 5000,

            device_preference: DevicePreference::Gpu,
            hash_algorithm: HashAlgorithm::Scrypt,
            batch_size: 256,
            cpu_threads: None,

            throttle_ms: 100,
            epoch_interval_ms: 10_000,

            max_device_retries: 3,
            retry_delay_ms: 1000,

            metrics_enabled: true,
            metrics_port: 9090,
            log_level: "info".to_string(),
        }
    }
}

fn parse<T: FromStr>(key: &str, val: String) -> Result<T, ConfigError> {
    val.parse().map_err(|_| ConfigError::InvalidEnvVar(key.to_string(), val))
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(val) = lookup("MINER_MODE") {
            config.mode = val.parse()?;
        }
        if let Some(val) = lookup("COORDINATOR_URL") {
            config.coordinator_url = val.trim_end_matches('/').to_string();
        }
        if let Some(val) = lookup("WORK_PATH") {
            config.work_path = val;
        }
        if let Some(val) = lookup("SUBMIT_PATH") {
            config.submit_path = val;
        }
        if let Some(val) = lookup("WALLET_ID") {
            config.wallet_id = val;
        }
        if let Some(val) = lookup("DRY_RUN") {
            config.dry_run = val == "1";
        }
        if let Some(val) = lookup("HTTP_TIMEOUT_MS") {
            config.http_timeout_ms = parse("HTTP_TIMEOUT_MS", val)?;
        }

        if let Some(val) = lookup("DEVICE_PREFERENCE") {
            config.device_preference = val.parse()?;
        }
        if let Some(val) = lookup("HASH_ALGORITHM") {
            config.hash_algorithm = val.parse()?;
        }
        if let Some(val) = lookup("BATCH_SIZE") {
            config.batch_size = parse("BATCH_SIZE", val)?;
        }
        if let Some(val) = lookup("CPU_THREADS") {
            config.cpu_threads = Some(parse("CPU_THREADS", val)?);
        }

        if let Some(val) = lookup("THROTTLE_MS") {
            config.throttle_ms = parse("THROTTLE_MS", val)?;
        }
        if let Some(val) = lookup("EPOCH_INTERVAL_MS") {
            config.epoch_interval_ms = parse("EPOCH_INTERVAL_MS", val)?;
        }

        if let Some(val) = lookup("MAX_DEVICE_RETRIES") {
            config.max_device_retries = parse("MAX_DEVICE_RETRIES", val)?;
        }
        if let Some(val) = lookup("RETRY_DELAY_MS") {
            config.retry_delay_ms = parse("RETRY_DELAY_MS", val)?;
        }

        if let Some(val) = lookup("METRICS_ENABLED") {
            config.metrics_enabled = val == "1";
        }
        if let Some(val) = lookup("METRICS_PORT") {
            config.metrics_port = parse("METRICS_PORT", val)?;
        }
        if let Some(val) = lookup("LOG_LEVEL") {
            config.log_level = val;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.wallet_id.trim().is_empty() {
            return Err(ConfigError::ValidationError("WALLET_ID must not be empty".to_string()));
        }
        if self.mode == Mode::Remote && !self.coordinator_url.starts_with("http") {
            return Err(ConfigError::ValidationError(
                "COORDINATOR_URL must be a valid HTTP URL".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "BATCH_SIZE must be greater than 0".to_string(),
            ));
        }
        if self.cpu_threads == Some(0) {
            return Err(ConfigError::ValidationError(
                "CPU_THREADS must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn work_url(&self) -> String {
        format!("{}{}", self.coordinator_url, self.work_path)
    }

    pub fn submit_url(&self) -> String {
        format!("{}{}", self.coordinator_url, self.submit_path)
    }

    pub fn get_throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    pub fn get_epoch_interval(&self) -> Duration {
        Duration::from_millis(self.epoch_interval_ms)
    }

    pub fn get_http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn get_retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_device_retries,
            retry_delay: self.get_retry_delay(),
            ..RetryConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_reference_miner() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.batch_size, 256);
        assert_eq!(config.throttle_ms, 100);
        assert_eq!(config.metrics_port, 9090);
        assert_eq!(config.submit_url(), "http://127.0.0.1:4001/submit_block");
        assert_eq!(config.device_preference, DevicePreference::Gpu);
        config.validate().unwrap();
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("MINER_MODE", "local"),
            ("COORDINATOR_URL", "http://pool:8000/"),
            ("DEVICE_PREFERENCE", "CPU"),
            ("HASH_ALGORITHM", "xor-fold"),
            ("BATCH_SIZE", "64"),
            ("DRY_RUN", "1"),
            ("MAX_DEVICE_RETRIES", "7"),
        ]))
        .unwrap();
        assert_eq!(config.mode, Mode::Local);
        assert_eq!(config.work_url(), "http://pool:8000/work");
        assert_eq!(config.device_preference, DevicePreference::Cpu);
        assert_eq!(config.hash_algorithm, HashAlgorithm::XorFold);
        assert_eq!(config.batch_size, 64);
        assert!(config.dry_run);
        assert_eq!(config.retry_config().max_retries, 7);
    }

    #[test]
    fn invalid_values_are_reported_with_key() {
        let err = Config::from_lookup(lookup(&[("BATCH_SIZE", "many")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(ref k, _) if k == "BATCH_SIZE"));

        let err = Config::from_lookup(lookup(&[("MINER_MODE", "pool")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(ref k, _) if k == "MINER_MODE"));
    }

    #[test]
    fn validation_rejects_unusable_settings() {
        let mut config = Config::default();
        config.wallet_id = " ".into();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.coordinator_url = "ftp://x".into();
        assert!(config.validate().is_err());
        config.mode = Mode::Local;
        assert!(config.validate().is_ok());
    }
}
