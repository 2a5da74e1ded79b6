//! Event history command

use anyhow::Result;
use serde_json::Value;
use tabled::Tabled;

use crate::client::{ApiClient, EventRecord};
use crate::output::{format_gib, format_success, print_warning, OutputFormat};

/// Row for the event history table
#[derive(Tabled)]
struct EventRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Type")]
    event_type: String,
    #[tabled(rename = "Result")]
    result: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

/// Show the event history of one volume
pub async fn show_events(
    client: &ApiClient,
    volume_id: &str,
    failed_only: bool,
    format: OutputFormat,
) -> Result<()> {
    let path = format!("api/v1/volumes/{}/events", volume_id);
    let mut events: Vec<EventRecord> = client.get(&path).await?;

    if failed_only {
        events.retain(|event| !event.success);
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&events)?);
        }
        OutputFormat::Table => {
            if events.is_empty() {
                print_warning("No events recorded for this volume");
                return Ok(());
            }

            let rows: Vec<EventRow> = events
                .iter()
                .map(|event| EventRow {
                    time: event.recorded_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                    event_type: event.kind.event_type.clone(),
                    result: format_success(event.success),
                    detail: summarize_detail(&event.kind.event_type, &event.kind.detail),
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
            println!("\nTotal: {} events", events.len());
        }
    }

    Ok(())
}

/// Compress an event detail payload into one table cell
fn summarize_detail(event_type: &str, detail: &Value) -> String {
    match event_type {
        "state_observation" => {
            let used = detail.get("used_gib").and_then(Value::as_f64);
            let total = detail.get("filesystem_size_gib").and_then(Value::as_f64);
            match (used, total) {
                (Some(used), Some(total)) => {
                    format!("{} / {} used", format_gib(used), format_gib(total))
                }
                _ => String::new(),
            }
        }
        "provider_resize" => {
            let original = detail.get("original_size_gib").and_then(Value::as_u64);
            let requested = detail.get("requested_size_gib").and_then(Value::as_u64);
            match (original, requested) {
                (Some(original), Some(requested)) => {
                    format!("{}Gi -> {}Gi", original, requested)
                }
                _ => String::new(),
            }
        }
        "filesystem_resize" => detail
            .get("mount_point")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_default(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_summarize_state_observation() {
        let detail = json!({ "used_gib": 85.0, "filesystem_size_gib": 99.5 });
        assert_eq!(
            summarize_detail("state_observation", &detail),
            "85.0Gi / 99.5Gi used"
        );
    }

    #[test]
    fn test_summarize_provider_resize() {
        let detail = json!({ "original_size_gib": 100, "requested_size_gib": 110 });
        assert_eq!(
            summarize_detail("provider_resize", &detail),
            "100Gi -> 110Gi"
        );
    }

    #[test]
    fn test_summarize_unknown_type() {
        assert_eq!(summarize_detail("other", &json!({})), "");
    }
}
