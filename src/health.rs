use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::metrics::{HealthStatus, Metrics, MetricsCollector};
use crate::types::{DevicePreference, HashAlgorithm, Mode};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub version: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DetailedStatus {
    pub health: String,
    pub metrics: Metrics,
    pub config_summary: ConfigSummary,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigSummary {
    pub mode: Mode,
    pub coordinator_url: String,
    pub wallet_id: String,
    pub device_preference: DevicePreference,
    pub hash_algorithm: HashAlgorithm,
    pub batch_size: usize,
    pub throttle_ms: u64,
}

pub struct HealthChecker {
    metrics: Arc<MetricsCollector>,
    config: Config,
}

impl HealthChecker {
    pub fn new(metrics: Arc<MetricsCollector>, config: Config) -> Self {
        Self { metrics, config }
    }

    pub fn get_health(&self) -> HealthResponse {
        HealthResponse {
            status: self.metrics.get_health_status().to_string(),
            uptime_seconds: self.metrics.get_metrics().uptime_seconds,
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Degraded still counts as serving; unhealthy and critical do not.
    pub fn is_healthy(&self) -> bool {
        !matches!(
            self.metrics.get_health_status(),
            HealthStatus::Unhealthy | HealthStatus::Critical
        )
    }

    pub fn get_detailed_status(&self) -> DetailedStatus {
        DetailedStatus {
            health: self.metrics.get_health_status().to_string(),
            metrics: self.metrics.get_metrics(),
            config_summary: ConfigSummary {
                mode: self.config.mode,
                coordinator_url: self.config.coordinator_url.clone(),
                wallet_id: self.config.wallet_id.clone(),
                device_preference: self.config.device_preference,
                hash_algorithm: self.config.hash_algorithm,
                batch_size: self.config.batch_size,
                throttle_ms: self.config.throttle_ms,
            },
        }
    }

    /// Prometheus text exposition, or `None` when metrics export is off.
    pub fn export_metrics(&self) -> Option<Result<String, std::fmt::Error>> {
        self.metrics.prometheus().map(|p| p.export_metrics())
    }
}
