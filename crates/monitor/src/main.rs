//! EBS Monitor - automatic capacity expansion for attached EBS volumes
//!
//! This binary runs unattended on an EC2 instance, watching the
//! filesystems backed by configured EBS volumes and growing volume and
//! filesystem when used space crosses the configured threshold.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use monitor_lib::{
    fs::LocalFilesystem,
    health::{components, HealthRegistry},
    history::{ErrorTracker, EventStore},
    models::VolumeConfig,
    observability::{MonitorMetrics, StructuredLogger},
    provider::Ec2Provider,
    stabilize::PollUntilStable,
    PollerBuilder,
};
use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const MONITOR_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Monitors and automatically resizes attached AWS EBS volumes
#[derive(Parser)]
#[command(name = "ebs-monitor", version, about)]
struct Cli {
    /// Config file path
    #[arg(long, short = 'c', env = "EBSMON_CONFIG_FILE")]
    config: String,

    /// Run in debug mode with extra output
    #[arg(long, short = 'd')]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with JSON output and env filter
    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(fmt::layer().json())
        .init();

    let config = config::MonitorConfig::load(&cli.config)?;

    let logger = StructuredLogger::new(&config.host_name);
    let metrics = MonitorMetrics::new();

    let health = HealthRegistry::new();
    health.register(components::POLLER).await;
    health.register(components::PROVIDER).await;
    health.register(components::FILESYSTEM).await;

    let provider = Arc::new(Ec2Provider::new());

    let volumes = if config.validate_on_start {
        validate_volumes(&provider, config.volumes.clone()).await?
    } else {
        config.volumes.clone()
    };

    logger.log_startup(MONITOR_VERSION, volumes.len(), config.check_interval_secs);
    metrics.set_volumes_monitored(volumes.len() as i64);

    let store = EventStore::new(logger.clone());
    let errors = ErrorTracker::new();

    let poller = PollerBuilder::new(volumes)
        .provider(provider)
        .filesystem(Arc::new(LocalFilesystem::new()))
        .stabilizer(Arc::new(PollUntilStable::new(logger.clone())))
        .store(store.clone())
        .errors(errors.clone())
        .health(health.clone())
        .metrics(metrics.clone())
        .logger(logger.clone())
        .interval(Duration::from_secs(config.check_interval_secs))
        .build()?;

    let app_state = Arc::new(api::AppState::new(
        health.clone(),
        metrics,
        store,
        errors,
    ));
    health.set_ready(true).await;

    // Start health/metrics/history server
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    let mut poller_handle = tokio::spawn(poller.run(shutdown_rx));

    let result = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            logger.log_shutdown("SIGINT received");
            let _ = shutdown_tx.send(());
            let _ = (&mut poller_handle).await;
            Ok(())
        }
        joined = &mut poller_handle => {
            match joined {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => {
                    logger.log_shutdown("monitoring exhausted");
                    Err(err.into())
                }
                Err(join_err) => Err(join_err.into()),
            }
        }
    };

    api_handle.abort();
    result
}

/// Check configured volumes against AWS, dropping the ones that do not
/// resolve
async fn validate_volumes(
    provider: &Ec2Provider,
    volumes: Vec<VolumeConfig>,
) -> Result<Vec<VolumeConfig>> {
    let mut valid = Vec::with_capacity(volumes.len());

    for volume in volumes {
        if !provider.validate_region(&volume.region).await? {
            warn!(
                volume_id = %volume.volume_id,
                region = %volume.region,
                "Dropping volume: unknown AWS region"
            );
            continue;
        }

        if !provider
            .validate_volume_id(&volume.volume_id, &volume.region)
            .await?
        {
            warn!(
                volume_id = %volume.volume_id,
                region = %volume.region,
                "Dropping volume: volume id does not resolve in AWS"
            );
            continue;
        }

        valid.push(volume);
    }

    if valid.is_empty() {
        bail!("no volumes passed AWS validation");
    }

    Ok(valid)
}
