//! API client for the EBS monitor daemon

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use std::collections::HashMap;
use url::Url;

/// HTTP client for the daemon's query API
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }
}

// API response types

/// Per-volume summary from `/api/v1/volumes`
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct VolumeSummary {
    pub volume_id: String,
    pub event_count: usize,
    pub consecutive_failures: u32,
    pub last_event_at: Option<DateTime<Utc>>,
    pub last_event_success: Option<bool>,
}

/// One history event from `/api/v1/volumes/{id}/events`
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct EventRecord {
    pub recorded_at: DateTime<Utc>,
    pub success: bool,
    pub kind: EventKindRecord,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct EventKindRecord {
    #[serde(rename = "type")]
    pub event_type: String,
    pub detail: serde_json::Value,
}

/// Daemon health from `/healthz`
#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct HealthRecord {
    pub status: String,
    pub components: HashMap<String, ComponentRecord>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct ComponentRecord {
    pub status: String,
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}
