//! Property-based test generators using proptest.
//!
//! Strategies produce events that satisfy the wire invariants: ids are
//! non-empty and unique within a batch, manifests draw from a small pool
//! so collisions actually happen.

use proptest::prelude::*;
use pulse_protocol::{ClientEvent, ServerEvent};
use std::collections::HashSet;

/// Manifest entries shared by generated events.
pub const RESOURCE_POOL: &[&str] = &["doc-1", "doc-2", "doc-3", "list-a", "list-b"];

/// Strategy for generating device ids.
pub fn device_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("device-[a-z0-9]{1,8}").expect("Invalid regex")
}

/// Strategy for generating manifests: zero to three entries from
/// [`RESOURCE_POOL`].
pub fn manifest_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(prop::sample::select(RESOURCE_POOL), 0..=3)
        .prop_map(|entries| entries.into_iter().map(str::to_string).collect())
}

/// Strategy for generating payloads.
pub fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..64)
}

/// Strategy for generating a single client event with the given id.
pub fn client_event_strategy(id: String) -> impl Strategy<Value = ClientEvent> {
    (
        prop::string::string_regex("[a-z]{1,8}").expect("Invalid regex"),
        payload_strategy(),
        manifest_strategy(),
        0i64..1_000,
    )
        .prop_map(move |(event_type, payload, manifest, created_at)| {
            ClientEvent::new(id.clone(), event_type, payload, created_at).with_manifest(manifest)
        })
}

/// Strategy for generating a batch of client events with unique ids.
pub fn pending_batch_strategy(max_len: usize) -> impl Strategy<Value = Vec<ClientEvent>> {
    prop::collection::hash_set("[a-z0-9]{1,12}", 0..=max_len)
        .prop_flat_map(|ids| {
            ids.into_iter()
                .map(client_event_strategy)
                .collect::<Vec<_>>()
        })
}

/// Strategy for generating server events from other devices, ids
/// ascending from 1.
pub fn server_events_strategy(max_len: usize) -> impl Strategy<Value = Vec<ServerEvent>> {
    prop::collection::vec((device_id_strategy(), client_event_strategy("seed".into())), 0..=max_len)
        .prop_map(|entries| {
            entries
                .into_iter()
                .enumerate()
                .map(|(i, (device, mut event))| {
                    event.client_event_id = format!("seed-{i}");
                    ServerEvent::from_client(i as i64 + 1, &device, &event)
                })
                .collect()
        })
}

/// A step in a generated multi-device workload.
#[derive(Debug, Clone)]
pub enum SyncStep {
    /// A device records a new event touching the given manifest.
    Record {
        /// Index of the acting device.
        device: usize,
        /// Manifest of the new event.
        manifest: Vec<String>,
    },
    /// A device runs one exchange.
    Sync {
        /// Index of the acting device.
        device: usize,
    },
    /// A device forgets its cursor and replays from the start.
    Rewind {
        /// Index of the acting device.
        device: usize,
    },
}

/// Strategy for generating a single workload step over `devices` devices.
pub fn sync_step_strategy(devices: usize) -> impl Strategy<Value = SyncStep> {
    prop_oneof![
        3 => (0..devices, manifest_strategy())
            .prop_map(|(device, manifest)| SyncStep::Record { device, manifest }),
        3 => (0..devices).prop_map(|device| SyncStep::Sync { device }),
        1 => (0..devices).prop_map(|device| SyncStep::Rewind { device }),
    ]
}

/// Strategy for generating a workload.
pub fn sync_workload_strategy(
    devices: usize,
    max_steps: usize,
) -> impl Strategy<Value = Vec<SyncStep>> {
    prop::collection::vec(sync_step_strategy(devices), 1..max_steps)
}

/// Returns true if no two events in `batch` share a client event id.
pub fn has_unique_ids(batch: &[ClientEvent]) -> bool {
    let mut seen = HashSet::new();
    batch.iter().all(|e| seen.insert(e.client_event_id.as_str()))
}
