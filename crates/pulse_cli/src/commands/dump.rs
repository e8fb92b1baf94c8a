//! Dump command implementation.

use crate::commands::read_log;
use serde::Serialize;
use std::path::Path;

/// Event representation for output.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventInfo {
    /// Offset in the log file.
    pub offset: u64,
    /// Server-assigned id.
    pub server_event_id: i64,
    /// Originating device.
    pub device_id: String,
    /// Client-assigned id.
    pub client_event_id: String,
    /// Client timestamp.
    pub created_at: i64,
    /// Resources the event touches.
    pub payload_manifest: Vec<String>,
    /// Payload size in bytes.
    pub payload_size: usize,
}

/// Runs the dump command.
pub fn run(
    path: &Path,
    after: i64,
    limit: Option<usize>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let events = collect(path, after, limit)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&events)?),
        _ => print_text_output(&events),
    }

    Ok(())
}

/// Returns up to `limit` events with an id greater than `after`.
pub fn collect(
    path: &Path,
    after: i64,
    limit: Option<usize>,
) -> Result<Vec<EventInfo>, Box<dyn std::error::Error>> {
    let contents = read_log(path)?;

    Ok(contents
        .frames
        .into_iter()
        .filter(|(_, event)| event.server_event_id > after)
        .take(limit.unwrap_or(usize::MAX))
        .map(|(offset, event)| EventInfo {
            offset,
            server_event_id: event.server_event_id,
            device_id: event.origin_client_device_id,
            client_event_id: event.origin_client_event_id,
            created_at: event.created_at,
            payload_size: event.payload.len(),
            payload_manifest: event.payload_manifest,
        })
        .collect())
}

fn print_text_output(events: &[EventInfo]) {
    println!("Events ({} total)", events.len());
    println!("================");
    println!();

    for event in events {
        print!(
            "[{:08}] #{:<6} {}/{} at={} size={}",
            event.offset,
            event.server_event_id,
            event.device_id,
            event.client_event_id,
            event.created_at,
            event.payload_size
        );
        if !event.payload_manifest.is_empty() {
            print!(" manifest={}", event.payload_manifest.join(","));
        }
        println!();
    }
}
