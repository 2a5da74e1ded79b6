//! Daemon health command

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ApiClient, HealthRecord};
use crate::output::{color_status, OutputFormat};

/// Row for the component health table
#[derive(Tabled)]
struct HealthRow {
    #[tabled(rename = "Component")]
    component: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// Show the daemon's component health
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: HealthRecord = client.get("healthz").await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&health)?);
        }
        OutputFormat::Table => {
            println!("Overall: {}", color_status(&health.status));

            let mut rows: Vec<HealthRow> = health
                .components
                .iter()
                .map(|(name, component)| HealthRow {
                    component: name.clone(),
                    status: color_status(&component.status),
                    message: component.message.clone().unwrap_or_default(),
                })
                .collect();
            rows.sort_by(|a, b| a.component.cmp(&b.component));

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
        }
    }

    Ok(())
}
