//! Main sync server.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::event_store::{EventStore, InMemoryEventStore};
use crate::handler::SyncCoordinator;
use crate::offset_store::{InMemoryOffsetStore, OffsetStore};
use pulse_protocol::{ConflictResolver, SyncRequest, SyncResponse, WireMessage};
use std::sync::Arc;

/// The sync server.
///
/// Wraps a [`SyncCoordinator`] and its stores behind request entry
/// points for each way a transport may hand over a request: typed,
/// async, JSON or CBOR bytes.
///
/// # Example
///
/// ```
/// use pulse_protocol::{ClientEvent, SyncRequest};
/// use pulse_server::{ServerConfig, SyncServer};
///
/// let server = SyncServer::new(ServerConfig::default());
///
/// let request = SyncRequest::new("phone", 0)
///     .with_pending(vec![ClientEvent::new("e1", "note", b"hi".to_vec(), 1)]);
/// let response = server.handle(&request).unwrap();
///
/// assert_eq!(response.success_client_event_ids, vec!["e1"]);
/// assert_eq!(response.new_server_events[0].server_event_id, 1);
/// ```
#[derive(Clone)]
pub struct SyncServer {
    coordinator: Arc<SyncCoordinator>,
    events: Arc<dyn EventStore>,
    offsets: Arc<dyn OffsetStore>,
}

impl SyncServer {
    /// Creates a server over fresh in-memory stores.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_stores(
            config,
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryOffsetStore::new()),
        )
    }

    /// Creates a server over existing stores.
    pub fn with_stores(
        config: ServerConfig,
        events: Arc<dyn EventStore>,
        offsets: Arc<dyn OffsetStore>,
    ) -> Self {
        let coordinator = SyncCoordinator::new(config, Arc::clone(&events), Arc::clone(&offsets));
        Self {
            coordinator: Arc::new(coordinator),
            events,
            offsets,
        }
    }

    /// Creates a server with a custom conflict resolver.
    pub fn with_resolver(
        config: ServerConfig,
        events: Arc<dyn EventStore>,
        offsets: Arc<dyn OffsetStore>,
        resolver: Arc<dyn ConflictResolver>,
    ) -> Self {
        let coordinator = SyncCoordinator::new(config, Arc::clone(&events), Arc::clone(&offsets))
            .with_resolver(resolver);
        Self {
            coordinator: Arc::new(coordinator),
            events,
            offsets,
        }
    }

    /// Handles a sync request on the calling thread.
    pub fn handle(&self, request: &SyncRequest) -> ServerResult<SyncResponse> {
        self.coordinator.handle(request)
    }

    /// Handles a sync request on tokio's blocking pool.
    ///
    /// Store operations may block on I/O, so the exchange runs off the
    /// async worker threads. The exchange keeps running to completion
    /// even if the returned future is dropped.
    pub async fn handle_async(&self, request: SyncRequest) -> ServerResult<SyncResponse> {
        let coordinator = Arc::clone(&self.coordinator);
        tokio::task::spawn_blocking(move || coordinator.handle(&request))
            .await
            .map_err(|e| ServerError::Internal(format!("sync task failed: {e}")))?
    }

    /// Handles a JSON-encoded request and returns the JSON response.
    pub fn handle_json(&self, body: &[u8]) -> ServerResult<Vec<u8>> {
        let request = SyncRequest::decode_json(body)?;
        Ok(self.handle(&request)?.encode_json()?)
    }

    /// Handles a CBOR-encoded request and returns the CBOR response.
    pub fn handle_cbor(&self, body: &[u8]) -> ServerResult<Vec<u8>> {
        let request = SyncRequest::decode_cbor(body)?;
        Ok(self.handle(&request)?.encode_cbor()?)
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        self.coordinator.config()
    }

    /// Returns the event store.
    pub fn event_store(&self) -> &Arc<dyn EventStore> {
        &self.events
    }

    /// Returns the offset store.
    pub fn offset_store(&self) -> &Arc<dyn OffsetStore> {
        &self.offsets
    }

    /// Returns the id of the newest committed event, or 0.
    pub fn latest_id(&self) -> ServerResult<i64> {
        Ok(self.events.latest_id()?)
    }
}
