//! Test fixtures: servers with automatic cleanup and simulated clients.

use pulse_protocol::{ClientEvent, ServerEvent, SyncRequest, SyncResponse, NO_CURSOR};
use pulse_server::{
    InMemoryOffsetStore, LogEventStore, ServerConfig, ServerResult, StoreResult, SyncServer,
};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

/// File name of the event log inside a file-backed test server's directory.
pub const LOG_FILE: &str = "events.log";

/// A sync server with automatic cleanup.
pub struct TestServer {
    /// The server instance.
    pub server: SyncServer,
    config: ServerConfig,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl TestServer {
    /// Creates a server over in-memory stores.
    pub fn memory() -> Self {
        Self::memory_with(ServerConfig::default())
    }

    /// Creates an in-memory server with the given configuration.
    pub fn memory_with(config: ServerConfig) -> Self {
        Self {
            server: SyncServer::new(config.clone()),
            config,
            temp_dir: None,
        }
    }

    /// Creates a server whose events live in a log file in a temporary
    /// directory.
    pub fn file() -> Self {
        Self::file_with(ServerConfig::default())
    }

    /// Creates a file-backed server with the given configuration.
    pub fn file_with(config: ServerConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        Self::open_in(temp_dir, config).expect("Failed to open event log")
    }

    fn open_in(temp_dir: TempDir, config: ServerConfig) -> StoreResult<Self> {
        let events = LogEventStore::open_file(&temp_dir.path().join(LOG_FILE))?;
        Ok(Self {
            server: SyncServer::with_stores(
                config.clone(),
                Arc::new(events),
                Arc::new(InMemoryOffsetStore::new()),
            ),
            config,
            temp_dir: Some(temp_dir),
        })
    }

    /// Returns the log path if file-backed, None if in-memory.
    pub fn log_path(&self) -> Option<PathBuf> {
        self.temp_dir.as_ref().map(|d| d.path().join(LOG_FILE))
    }

    /// Simulates a process restart.
    ///
    /// A file-backed server replays its log; an in-memory server comes
    /// back empty. Offsets are not persisted in either case.
    pub fn restart(self) -> StoreResult<Self> {
        let Self {
            server,
            config,
            temp_dir,
        } = self;
        // Release the log's file lock before reopening it.
        drop(server);
        match temp_dir {
            Some(dir) => Self::open_in(dir, config),
            None => Ok(Self::memory_with(config)),
        }
    }

    /// Returns the directory holding the log, if file-backed.
    pub fn dir(&self) -> Option<&Path> {
        self.temp_dir.as_ref().map(TempDir::path)
    }
}

impl std::ops::Deref for TestServer {
    type Target = SyncServer;

    fn deref(&self) -> &Self::Target {
        &self.server
    }
}

/// Builds a client event with an empty payload.
pub fn client_event(id: &str, manifest: &[&str], created_at: i64) -> ClientEvent {
    ClientEvent::new(id, "test", Vec::new(), created_at).with_manifest(manifest.iter().copied())
}

/// A simulated device: an outbox of unsent events and a projection of
/// everything received from the server.
///
/// After each exchange it drops acknowledged and rejected events from the
/// outbox and advances its cursor to the highest id received, the way a
/// real client would.
#[derive(Debug, Clone)]
pub struct TestClient {
    device_id: String,
    cursor: i64,
    clock: i64,
    outbox: Vec<ClientEvent>,
    projection: BTreeMap<i64, ServerEvent>,
    rejected: BTreeMap<String, String>,
}

impl TestClient {
    /// Creates a client that has seen nothing yet.
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            cursor: NO_CURSOR,
            clock: 0,
            outbox: Vec::new(),
            projection: BTreeMap::new(),
            rejected: BTreeMap::new(),
        }
    }

    /// Returns the device id.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Returns the cursor the next request will carry.
    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    /// Overrides the cursor, e.g. to replay from the start.
    pub fn set_cursor(&mut self, cursor: i64) {
        self.cursor = cursor;
    }

    /// Sets the logical clock used for `created_at` of recorded events.
    pub fn set_clock(&mut self, now: i64) {
        self.clock = now;
    }

    /// Records a new local event touching `manifest` and returns its id.
    pub fn record(&mut self, manifest: &[&str]) -> String {
        self.clock += 1;
        let id = Uuid::new_v4().to_string();
        let event = ClientEvent::new(id.clone(), "test", id.as_bytes().to_vec(), self.clock)
            .with_manifest(manifest.iter().copied());
        self.outbox.push(event);
        id
    }

    /// Queues an already-built event.
    pub fn queue(&mut self, event: ClientEvent) {
        self.outbox.push(event);
    }

    /// Events not yet acknowledged or rejected.
    pub fn outbox(&self) -> &[ClientEvent] {
        &self.outbox
    }

    /// Every server event received so far, by id.
    pub fn projection(&self) -> &BTreeMap<i64, ServerEvent> {
        &self.projection
    }

    /// Rejected events and their reasons.
    pub fn rejected(&self) -> &BTreeMap<String, String> {
        &self.rejected
    }

    /// Builds the request for the next exchange.
    pub fn request(&self) -> SyncRequest {
        SyncRequest::new(self.device_id.clone(), self.cursor).with_pending(self.outbox.clone())
    }

    /// Runs one exchange and applies its response. On error the client
    /// state is left untouched, so the same exchange can be retried.
    pub fn sync(&mut self, server: &SyncServer) -> ServerResult<SyncResponse> {
        let response = server.handle(&self.request())?;
        self.apply(&response);
        Ok(response)
    }

    /// Applies a response to the outbox, projection and cursor.
    pub fn apply(&mut self, response: &SyncResponse) {
        let settled: HashSet<&str> = response
            .success_client_event_ids
            .iter()
            .chain(response.error_client_event_ids.keys())
            .map(String::as_str)
            .collect();
        self.outbox
            .retain(|event| !settled.contains(event.client_event_id.as_str()));

        self.rejected.extend(
            response
                .error_client_event_ids
                .iter()
                .map(|(id, reason)| (id.clone(), reason.clone())),
        );
        for event in &response.new_server_events {
            self.projection.insert(event.server_event_id, event.clone());
        }
        self.cursor = response.next_cursor(self.cursor);
    }
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates a server where each of `devices` clients has synced
    /// `events_per_device` untracked events, one exchange per device.
    pub fn populated_server(devices: usize, events_per_device: usize) -> (TestServer, Vec<TestClient>) {
        let server = TestServer::memory();
        let mut clients: Vec<TestClient> = (0..devices)
            .map(|i| TestClient::new(format!("device-{i}")))
            .collect();

        for client in &mut clients {
            for _ in 0..events_per_device {
                client.record(&[]);
            }
            client.sync(&server).expect("Failed to sync");
        }

        (server, clients)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_tracks_cursor_and_outbox() {
        let server = TestServer::memory();
        let mut client = TestClient::new("phone");
        client.record(&["doc"]);
        client.record(&[]);

        let response = client.sync(&server).unwrap();
        assert_eq!(response.success_client_event_ids.len(), 2);
        assert!(client.outbox().is_empty());
        assert_eq!(client.cursor(), 2);
        assert_eq!(client.projection().len(), 2);
    }

    #[test]
    fn rejected_events_leave_outbox() {
        let server = TestServer::memory();
        let mut first = TestClient::new("a");
        let mut second = TestClient::new("b");

        first.record(&["doc"]);
        first.sync(&server).unwrap();

        let id = second.record(&["doc"]);
        second.sync(&server).unwrap();

        assert!(second.outbox().is_empty());
        assert!(second.rejected().contains_key(&id));
        assert_eq!(second.cursor(), 1);
    }

    #[test]
    fn file_server_restarts_with_its_log() {
        let server = TestServer::file();
        assert!(server.log_path().is_some());
        let mut client = TestClient::new("phone");
        client.record(&[]);
        client.sync(&server).unwrap();

        let server = server.restart().unwrap();
        assert_eq!(server.latest_id().unwrap(), 1);
        assert!(server.dir().is_some());
    }

    #[test]
    fn populated_scenario() {
        let (server, clients) = scenarios::populated_server(3, 4);
        assert_eq!(server.latest_id().unwrap(), 12);
        assert_eq!(clients[2].cursor(), 12);
        assert_eq!(clients[0].cursor(), 4);
    }
}
