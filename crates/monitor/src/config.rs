//! Daemon configuration

use anyhow::{bail, Context, Result};
use monitor_lib::models::VolumeConfig;
use serde::Deserialize;
use tracing::warn;

/// Daemon configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Pause between monitoring passes, in seconds
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    /// API server port for health/metrics/history
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Host name attached to every structured log record
    #[serde(default = "default_host_name")]
    pub host_name: String,

    /// Validate volume ids and regions against AWS before monitoring
    /// starts. Off by default so the daemon can come up while AWS is
    /// briefly unreachable.
    #[serde(default)]
    pub validate_on_start: bool,

    /// Volumes to monitor
    #[serde(default)]
    pub volumes: Vec<VolumeConfig>,
}

fn default_check_interval() -> u64 {
    60
}

fn default_api_port() -> u16 {
    8080
}

fn default_host_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}

impl MonitorConfig {
    /// Load configuration from a YAML file plus `EBSMON_`-prefixed
    /// environment overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("EBSMON").separator("__"))
            .build()
            .with_context(|| format!("failed to read the configuration file: {}", path))?;

        Self::from_settings(settings)
    }

    fn from_settings(settings: config::Config) -> Result<Self> {
        let mut config: MonitorConfig = settings
            .try_deserialize()
            .context("failed to deserialize the configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Drop unusable volume entries and reject an unusable configuration
    fn validate(&mut self) -> Result<()> {
        if self.check_interval_secs == 0 {
            bail!("check_interval_secs must be positive");
        }

        self.volumes.retain(|volume| match volume_entry_error(volume) {
            None => true,
            Some(reason) => {
                warn!(
                    volume_id = %volume.volume_id,
                    device_name = %volume.device_name,
                    reason = reason,
                    "Dropping invalid volume entry from configuration"
                );
                false
            }
        });

        if self.volumes.is_empty() {
            bail!("no valid volumes in configuration");
        }

        Ok(())
    }
}

/// Why a volume entry cannot be monitored, if anything
fn volume_entry_error(volume: &VolumeConfig) -> Option<&'static str> {
    if !volume.volume_id.starts_with("vol-") {
        Some("volume_id must look like 'vol-...'")
    } else if volume.device_name.is_empty() {
        Some("device_name is required")
    } else if volume.region.is_empty() {
        Some("region is required")
    } else if volume.increment_gib == 0 && volume.increment_percent == 0 {
        Some("one of increment_gib or increment_percent must be positive")
    } else if !(volume.threshold_percent > 0.0 && volume.threshold_percent <= 100.0) {
        Some("threshold_percent must be in (0, 100]")
    } else {
        None
    }
}
