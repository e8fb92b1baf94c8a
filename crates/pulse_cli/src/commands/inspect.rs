//! Inspect command implementation.

use crate::commands::read_log;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Event log inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Log path.
    pub path: String,
    /// Log size in bytes.
    pub size: u64,
    /// Number of committed events.
    pub event_count: usize,
    /// Id of the newest event, 0 when empty.
    pub latest_id: i64,
    /// Offset of a torn trailing frame, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub torn_tail_at: Option<u64>,
    /// Committed events per device.
    pub devices: BTreeMap<String, usize>,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(path)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }

    Ok(())
}

/// Collects statistics about the log at `path`.
pub fn inspect(path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let contents = read_log(path)?;

    let mut devices = BTreeMap::new();
    for (_, event) in &contents.frames {
        *devices
            .entry(event.origin_client_device_id.clone())
            .or_insert(0) += 1;
    }

    Ok(InspectResult {
        path: path.display().to_string(),
        size: contents.size,
        event_count: contents.frames.len(),
        latest_id: contents
            .frames
            .last()
            .map(|(_, e)| e.server_event_id)
            .unwrap_or(0),
        torn_tail_at: contents.torn_at,
        devices,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("Event log: {}", result.path);
    println!("================");
    println!("Size:        {} bytes", result.size);
    println!("Events:      {}", result.event_count);
    println!("Latest id:   {}", result.latest_id);
    if let Some(offset) = result.torn_tail_at {
        println!("Torn tail:   at offset {} (repaired on next open)", offset);
    }

    if !result.devices.is_empty() {
        println!();
        println!("Devices:");
        for (device, count) in &result.devices {
            println!("  {:24} {}", device, count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_protocol::ClientEvent;
    use pulse_server::{EventStore, LogEventStore};
    use tempfile::tempdir;

    #[test]
    fn inspect_counts_devices() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.log");
        {
            let store = LogEventStore::open_file(&path).unwrap();
            for (device, id) in [("a", "1"), ("b", "2"), ("a", "3")] {
                store
                    .append(device, &ClientEvent::new(id, "t", Vec::new(), 0))
                    .unwrap();
            }
        }

        let result = inspect(&path).unwrap();
        assert_eq!(result.event_count, 3);
        assert_eq!(result.latest_id, 3);
        assert_eq!(result.devices.get("a"), Some(&2));
        assert!(result.torn_tail_at.is_none());
    }

    #[test]
    fn inspect_reports_torn_tail_without_repairing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.log");
        {
            let store = LogEventStore::open_file(&path).unwrap();
            store
                .append("a", &ClientEvent::new("1", "t", Vec::new(), 0))
                .unwrap();
        }
        let good = std::fs::metadata(&path).unwrap().len();
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.extend_from_slice(b"PLSE\x10");
        std::fs::write(&path, &bytes).unwrap();

        let result = inspect(&path).unwrap();
        assert_eq!(result.event_count, 1);
        assert_eq!(result.torn_tail_at, Some(good));
        assert_eq!(result.size, good + 5);
    }

    #[test]
    fn missing_log_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(inspect(&dir.path().join("absent.log")).is_err());
    }
}
