//! Volume status command

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ApiClient, VolumeSummary};
use crate::output::{format_success, print_warning, OutputFormat};

/// Row for the volume status table
#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "Volume")]
    volume_id: String,
    #[tabled(rename = "Events")]
    event_count: usize,
    #[tabled(rename = "Failures")]
    consecutive_failures: u32,
    #[tabled(rename = "Last Event")]
    last_event: String,
    #[tabled(rename = "Last Result")]
    last_result: String,
}

/// Show a summary of every volume the daemon has seen
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let summaries: Vec<VolumeSummary> = client.get("api/v1/volumes").await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&summaries)?);
        }
        OutputFormat::Table => {
            if summaries.is_empty() {
                print_warning("No volumes known to the monitor");
                return Ok(());
            }

            let rows: Vec<StatusRow> = summaries
                .iter()
                .map(|s| StatusRow {
                    volume_id: s.volume_id.clone(),
                    event_count: s.event_count,
                    consecutive_failures: s.consecutive_failures,
                    last_event: s
                        .last_event_at
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    last_result: s
                        .last_event_success
                        .map(format_success)
                        .unwrap_or_else(|| "-".to_string()),
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
        }
    }

    Ok(())
}
