//! AWS EC2 implementation of the block-storage provider

use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_ec2::error::ProvideErrorMetadata;
use aws_sdk_ec2::types::{Volume, VolumeModificationState};
use aws_sdk_ec2::Client;
use tokio::sync::RwLock;
use tracing::debug;

use super::{BlockStorageProvider, ModificationState};
use crate::models::VolumeConfig;

/// Error code EC2 returns when a volume has no modification on record
const NO_MODIFICATION_CODE: &str = "InvalidVolumeModification.NotFound";

/// EBS access via the AWS SDK
///
/// Clients are created lazily per region and cached; volumes in the same
/// region share one client.
#[derive(Default)]
pub struct Ec2Provider {
    clients: RwLock<HashMap<String, Client>>,
}

impl Ec2Provider {
    pub fn new() -> Self {
        Self::default()
    }

    async fn client(&self, region: &str) -> Client {
        if let Some(client) = self.clients.read().await.get(region) {
            return client.clone();
        }

        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        let client = Client::new(&config);

        let mut clients = self.clients.write().await;
        clients.insert(region.to_string(), client.clone());
        client
    }

    async fn describe_volume(&self, volume: &VolumeConfig) -> Result<Volume> {
        let client = self.client(&volume.region).await;

        let response = client
            .describe_volumes()
            .volume_ids(&volume.volume_id)
            .send()
            .await
            .context("failed to get volume information from AWS")?;

        response
            .volumes()
            .first()
            .cloned()
            .ok_or_else(|| anyhow!("volume {} not found", volume.volume_id))
    }

    /// Check that a volume id resolves in the given region.
    ///
    /// Used by startup validation; a lookup failure for an unknown id is
    /// reported as `false`, any other API failure as an error.
    pub async fn validate_volume_id(&self, volume_id: &str, region: &str) -> Result<bool> {
        let client = self.client(region).await;

        match client
            .describe_volumes()
            .volume_ids(volume_id)
            .send()
            .await
        {
            Ok(response) => Ok(!response.volumes().is_empty()),
            Err(err) if err.code() == Some("InvalidVolume.NotFound") => Ok(false),
            Err(err) => {
                Err(anyhow!(err).context("failed to call DescribeVolumes to validate volume id"))
            }
        }
    }

    /// Check that a region name is one AWS knows about
    pub async fn validate_region(&self, region: &str) -> Result<bool> {
        // DescribeRegions is region-agnostic; any working endpoint serves
        let client = self.client("us-east-1").await;

        let response = client
            .describe_regions()
            .send()
            .await
            .context("failed to retrieve AWS regions")?;

        Ok(response
            .regions()
            .iter()
            .filter_map(|r| r.region_name())
            .any(|name| name == region))
    }
}

#[async_trait]
impl BlockStorageProvider for Ec2Provider {
    async fn capacity_gib(&self, volume: &VolumeConfig) -> Result<u64> {
        let described = self.describe_volume(volume).await?;

        let size = described
            .size()
            .ok_or_else(|| anyhow!("volume {} has no reported size", volume.volume_id))?;

        Ok(size as u64)
    }

    async fn modification_state(&self, volume: &VolumeConfig) -> Result<ModificationState> {
        let client = self.client(&volume.region).await;

        let response = match client
            .describe_volumes_modifications()
            .volume_ids(&volume.volume_id)
            .send()
            .await
        {
            Ok(response) => response,
            // No modification on record at all: the volume is idle
            Err(err) if err.code() == Some(NO_MODIFICATION_CODE) => {
                return Ok(ModificationState::Idle)
            }
            Err(err) => {
                return Err(
                    anyhow!(err).context("failed to get volume modification information from AWS")
                )
            }
        };

        let state = match response
            .volumes_modifications()
            .first()
            .and_then(|m| m.modification_state())
        {
            None => ModificationState::Idle,
            Some(VolumeModificationState::Modifying) => ModificationState::Modifying,
            Some(VolumeModificationState::Optimizing) => ModificationState::Optimizing,
            Some(VolumeModificationState::Completed) => ModificationState::Completed,
            Some(VolumeModificationState::Failed) => ModificationState::Failed,
            Some(_) => ModificationState::Idle,
        };

        debug!(
            volume_id = %volume.volume_id,
            state = %state,
            "Queried volume modification state"
        );

        Ok(state)
    }

    async fn resize(&self, volume: &VolumeConfig, new_size_gib: u64) -> Result<()> {
        let client = self.client(&volume.region).await;

        client
            .modify_volume()
            .volume_id(&volume.volume_id)
            .size(new_size_gib as i32)
            .send()
            .await
            .context("failed to modify EBS volume in AWS")?;

        Ok(())
    }
}
