//! Fuzz testing harnesses.
//!
//! These targets can be driven by cargo-fuzz or any other fuzzer that
//! hands over raw bytes. Each one must return normally for every input.

use crate::fixtures::TestClient;
use crate::generators::{SyncStep, RESOURCE_POOL};
use crate::stress::verify_log;
use pulse_protocol::{SyncRequest, SyncResponse, WireMessage};
use pulse_server::{EventStore, LogEventStore, ServerConfig, StoreError, SyncServer};
use pulse_storage::MemoryBackend;

/// Fuzz target for JSON request handling.
///
/// Arbitrary bytes either fail to decode with a client error or are
/// handled, and the response always re-encodes.
pub fn fuzz_request_json(data: &[u8]) {
    let server = SyncServer::new(ServerConfig::default());
    match server.handle_json(data) {
        Ok(body) => {
            let response = SyncResponse::decode_json(&body).expect("response must decode");
            assert!(response.next_heartbeat_ms > 0);
        }
        Err(e) => assert!(e.is_client_error(), "unexpected server error: {e}"),
    }
}

/// Fuzz target for CBOR request decoding.
pub fn fuzz_request_cbor(data: &[u8]) {
    if let Ok(request) = SyncRequest::decode_cbor(data) {
        let encoded = request.encode_cbor().expect("decoded request must re-encode");
        let again = SyncRequest::decode_cbor(&encoded).expect("re-encoded request must decode");
        assert_eq!(request, again, "Roundtrip mismatch");
    }
}

/// Fuzz target for event log replay.
///
/// Opening arbitrary bytes as a log either reports corruption or yields
/// a consistent store that accepts the next append.
pub fn fuzz_log_replay(data: &[u8]) {
    match LogEventStore::open(MemoryBackend::with_bytes(data.to_vec())) {
        Ok(store) => {
            let latest = store.latest_id().expect("memory store cannot fail");
            let event = pulse_protocol::ClientEvent::new("fuzz", "t", Vec::new(), 0);
            let stored = store.append("fuzz-device", &event).expect("append after replay");
            assert!(stored.server_event_id > latest);
        }
        Err(StoreError::Corrupted { .. }) => {}
        Err(e) => panic!("unexpected replay error: {e}"),
    }
}

/// Number of simulated devices in [`fuzz_exchanges`].
pub const FUZZ_DEVICES: usize = 3;

/// Parses fuzzer input into workload steps over [`FUZZ_DEVICES`] devices.
pub fn parse_steps(data: &[u8]) -> Vec<SyncStep> {
    data.chunks(2)
        .map(|chunk| {
            let op = chunk[0];
            let arg = chunk.get(1).copied().unwrap_or(0) as usize;
            let device = (op as usize / 3) % FUZZ_DEVICES;
            match op % 3 {
                0 => SyncStep::Record {
                    device,
                    manifest: match arg % (RESOURCE_POOL.len() + 1) {
                        0 => Vec::new(),
                        r => vec![RESOURCE_POOL[r - 1].to_string()],
                    },
                },
                1 => SyncStep::Sync { device },
                _ => SyncStep::Rewind { device },
            }
        })
        .collect()
}

/// Runs `steps` against `server` with one simulated client per device,
/// then checks the log and returns the clients.
pub fn execute_steps(steps: &[SyncStep], server: &SyncServer, devices: usize) -> Vec<TestClient> {
    let mut clients: Vec<TestClient> = (0..devices)
        .map(|d| TestClient::new(format!("device-{d}")))
        .collect();

    for step in steps {
        match step {
            SyncStep::Record { device, manifest } => {
                let manifest: Vec<&str> = manifest.iter().map(String::as_str).collect();
                clients[*device].record(&manifest);
            }
            SyncStep::Sync { device } => {
                clients[*device].sync(server).expect("in-memory sync cannot fail");
            }
            SyncStep::Rewind { device } => clients[*device].set_cursor(0),
        }
    }

    if let Err(e) = verify_log(server.event_store().as_ref()) {
        panic!("log invariant violated: {e}");
    }
    clients
}

/// Fuzz target for whole sync exchanges between several devices.
pub fn fuzz_exchanges(data: &[u8]) {
    let server = SyncServer::new(ServerConfig::default());
    execute_steps(&parse_steps(data), &server, FUZZ_DEVICES);
}
