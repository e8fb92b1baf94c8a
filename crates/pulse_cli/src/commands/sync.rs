//! Sync command implementation.

use pulse_protocol::{ConflictPolicy, SyncRequest, WireMessage};
use pulse_server::{EventStore, InMemoryOffsetStore, LogEventStore, ServerConfig, SyncServer};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Options for the sync command.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Conflict policy to arbitrate with.
    pub policy: ConflictPolicy,
    /// Suggested heartbeat in milliseconds.
    pub heartbeat_ms: u64,
    /// Maximum pending events per request, if capped.
    pub max_pending: Option<usize>,
    /// Skip syncing the log after each append.
    pub no_sync: bool,
}

/// Runs the sync command: one exchange against the log at `log_path`.
///
/// The request is read from `request_path`, or from stdin when it is
/// `-`. The response is printed as pretty JSON.
pub fn run(
    log_path: &Path,
    request_path: &Path,
    options: &SyncOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let body = read_request(request_path)?;
    let request = SyncRequest::decode_json(&body)?;

    let store = LogEventStore::open_file(log_path)?.sync_on_append(!options.no_sync);
    info!(
        "Opened event log {:?} ({} events, {} bytes)",
        log_path,
        store.len()?,
        store.log_size()
    );

    let mut config = ServerConfig::new()
        .with_conflict_policy(options.policy)
        .with_heartbeat_interval(Duration::from_millis(options.heartbeat_ms));
    if let Some(max) = options.max_pending {
        config = config.with_max_pending_events(max);
    }
    let server = SyncServer::with_stores(config, Arc::new(store), Arc::new(InMemoryOffsetStore::new()));

    let response = server.handle(&request)?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn read_request(path: &Path) -> std::io::Result<Vec<u8>> {
    if path == Path::new("-") {
        let mut body = Vec::new();
        std::io::stdin().read_to_end(&mut body)?;
        Ok(body)
    } else {
        std::fs::read(path)
    }
}
