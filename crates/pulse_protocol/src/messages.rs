//! The sync exchange: one request, one response.

use crate::codec::{null_as_default, WireMessage};
use crate::event::{ClientEvent, ServerEvent};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A device's half of a sync exchange.
///
/// `last_known_server_event_id` is the device's claimed cursor. The
/// server treats it as untrusted input and never re-derives it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    /// Submitting device.
    pub device_id: String,
    /// Locally created events not yet acknowledged.
    #[serde(default, deserialize_with = "null_as_default")]
    pub pending_events: Vec<ClientEvent>,
    /// Highest server event id the device has received.
    #[serde(default)]
    pub last_known_server_event_id: i64,
}

impl SyncRequest {
    /// Creates a request with no pending events.
    pub fn new(device_id: impl Into<String>, last_known_server_event_id: i64) -> Self {
        Self {
            device_id: device_id.into(),
            pending_events: Vec::new(),
            last_known_server_event_id,
        }
    }

    /// Sets the pending events.
    pub fn with_pending(mut self, pending_events: Vec<ClientEvent>) -> Self {
        self.pending_events = pending_events;
        self
    }
}

/// The server's half of a sync exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    /// Pending events that were admitted (or were already committed).
    #[serde(default, deserialize_with = "null_as_default")]
    pub success_client_event_ids: Vec<String>,
    /// Events the device has not seen, ascending within each part and
    /// free of duplicates: this exchange's appends first, then the backlog.
    #[serde(default, deserialize_with = "null_as_default")]
    pub new_server_events: Vec<ServerEvent>,
    /// Advisory delay before the next exchange.
    #[serde(default)]
    pub next_heartbeat_ms: i32,
    /// Rejected pending events mapped to a machine-readable reason.
    #[serde(default, deserialize_with = "null_as_default")]
    pub error_client_event_ids: BTreeMap<String, String>,
}

impl SyncResponse {
    /// The cursor a client should send next: the highest id delivered,
    /// or `current` if nothing newer arrived.
    pub fn next_cursor(&self, current: i64) -> i64 {
        self.new_server_events
            .iter()
            .map(|e| e.server_event_id)
            .fold(current, i64::max)
    }

    /// Returns the rejection reason for a pending event, if any.
    pub fn rejection(&self, client_event_id: &str) -> Option<&str> {
        self.error_client_event_ids
            .get(client_event_id)
            .map(String::as_str)
    }
}

impl WireMessage for SyncRequest {}
impl WireMessage for SyncResponse {}
