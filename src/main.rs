use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use poh_miner::backend;
use poh_miner::config::Config;
use poh_miner::error_handling::ConfigError;
use poh_miner::health::HealthChecker;
use poh_miner::logging;
use poh_miner::metrics::MetricsCollector;
use poh_miner::miner::{LoopSettings, MiningLoop};
use poh_miner::prometheus_metrics::PrometheusMetrics;
use poh_miner::server::MetricsServer;
use poh_miner::submit;
use poh_miner::work;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    config.validate()?;
    logging::init(&config.log_level);

    info!(
        mode = ?config.mode,
        coordinator = %config.coordinator_url,
        wallet = %config.wallet_id,
        algorithm = %config.hash_algorithm,
        batch_size = config.batch_size,
        "Starting miner"
    );

    let device = backend::open_backend(&config).map_err(|e| {
        error!(error = %e, "No compute device available");
        ConfigError::NoDevice(e.to_string())
    })?;
    info!(device = device.device_name(), batch_size = device.batch_size(), "Compute device ready");

    let prometheus = config.metrics_enabled.then(PrometheusMetrics::new);
    let metrics = Arc::new(MetricsCollector::new(prometheus));

    if config.metrics_enabled {
        let checker = Arc::new(HealthChecker::new(Arc::clone(&metrics), config.clone()));
        let server = MetricsServer::new(checker, config.metrics_port);
        match server.bind().await {
            Ok(listener) => {
                tokio::spawn(async move {
                    if let Err(e) = server.serve(listener).await {
                        warn!(error = %e, "Metrics server stopped");
                    }
                });
            }
            Err(e) => warn!(
                port = config.metrics_port,
                error = %e,
                "Metrics port unavailable, continuing without it"
            ),
        }
    }

    let work_source = work::from_config(&config).context("building work source")?;
    let submitter = submit::from_config(&config).context("building submitter")?;

    let mut miner = MiningLoop::new(
        LoopSettings::from_config(&config),
        device,
        backend::factory(&config),
        work_source,
        submitter,
        metrics.clone(),
    );

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
            on_signal.cancel();
        }
    });

    if let Err(e) = miner.run(shutdown).await {
        error!(error = %e, "Miner exiting");
        return Err(e.into());
    }

    let m = metrics.get_metrics();
    info!(
        batches = m.batches,
        hashes = m.hashes,
        accepted = m.submissions_accepted,
        rejected = m.submissions_rejected,
        "Miner stopped"
    );
    Ok(())
}
