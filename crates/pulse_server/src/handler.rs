//! The sync exchange pipeline.

use crate::config::ServerConfig;
use crate::diastole::DownloadProcessor;
use crate::error::{ServerError, ServerResult};
use crate::event_store::EventStore;
use crate::offset_store::OffsetStore;
use crate::systole::UploadProcessor;
use pulse_protocol::{ConflictResolver, ManifestConflictResolver, ServerEvent, SyncRequest, SyncResponse};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Runs one sync exchange at a time against shared stores.
///
/// Each call to [`SyncCoordinator::handle`] goes through the phases in a
/// fixed order:
///
/// 1. download the backlog past the device's cursor
/// 2. arbitrate the pending events against that backlog
/// 3. drop the rejected events
/// 4. upload the admitted ones
/// 5. answer with the fresh appends followed by the backlog
///
/// The download happens before the upload, so a device's new events
/// are only ever compared against what it had not yet seen.
pub struct SyncCoordinator {
    config: ServerConfig,
    download: DownloadProcessor,
    upload: UploadProcessor,
    resolver: Arc<dyn ConflictResolver>,
}

impl SyncCoordinator {
    /// Creates a coordinator using the resolver for the configured policy.
    pub fn new(
        config: ServerConfig,
        events: Arc<dyn EventStore>,
        offsets: Arc<dyn OffsetStore>,
    ) -> Self {
        let resolver = Arc::new(ManifestConflictResolver::new(config.conflict_policy));
        Self {
            download: DownloadProcessor::new(Arc::clone(&events), Arc::clone(&offsets)),
            upload: UploadProcessor::new(events, offsets),
            resolver,
            config,
        }
    }

    /// Replaces the conflict resolver.
    pub fn with_resolver(mut self, resolver: Arc<dyn ConflictResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Processes one exchange.
    ///
    /// Conflicts are reported per event in the response. Only store
    /// failures and an opt-in batch limit surface as errors; events committed
    /// before a store failure stay committed and are redelivered on the
    /// next exchange.
    pub fn handle(&self, request: &SyncRequest) -> ServerResult<SyncResponse> {
        self.validate(request)?;

        let device_id = request.device_id.as_str();
        let cursor = request.last_known_server_event_id;
        info!(
            device_id,
            cursor,
            pending = request.pending_events.len(),
            "sync started"
        );

        let backlog = self.download.process(device_id, cursor)?;
        debug!(device_id, backlog = backlog.len(), "download complete");

        let resolution = self.resolver.resolve(&request.pending_events, &backlog);
        if !resolution.errors.is_empty() {
            debug!(device_id, rejected = resolution.errors.len(), "conflicts detected");
        }

        let admitted = resolution.admitted();
        let accepted = request
            .pending_events
            .iter()
            .filter(|event| admitted.contains(event.client_event_id.as_str()));
        let appended = self.upload.process(device_id, accepted)?;
        debug!(device_id, appended = appended.len(), "upload complete");

        let new_server_events = merge_unique(appended, backlog);
        info!(
            device_id,
            accepted = resolution.success_ids.len(),
            rejected = resolution.errors.len(),
            delivered = new_server_events.len(),
            "sync finished"
        );

        Ok(SyncResponse {
            success_client_event_ids: resolution.success_ids,
            new_server_events,
            next_heartbeat_ms: self.config.heartbeat_ms(),
            error_client_event_ids: resolution.errors,
        })
    }

    fn validate(&self, request: &SyncRequest) -> ServerResult<()> {
        match self.config.max_pending_events {
            Some(limit) if request.pending_events.len() > limit => Err(ServerError::BatchTooLarge {
                size: request.pending_events.len(),
                limit,
            }),
            _ => Ok(()),
        }
    }
}

/// Concatenates `first` and `second`, keeping the first occurrence of each
/// server event id.
fn merge_unique(first: Vec<ServerEvent>, second: Vec<ServerEvent>) -> Vec<ServerEvent> {
    let mut seen = HashSet::with_capacity(first.len() + second.len());
    first
        .into_iter()
        .chain(second)
        .filter(|event| seen.insert(event.server_event_id))
        .collect()
}
