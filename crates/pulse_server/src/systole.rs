//! Upload phase: commit admitted client events.

use crate::error::StoreResult;
use crate::event_store::EventStore;
use crate::offset_store::OffsetStore;
use pulse_protocol::{ClientEvent, ServerEvent};
use std::sync::Arc;
use tracing::trace;

/// Appends a device's events to the log, skipping ones already committed.
#[derive(Clone)]
pub struct UploadProcessor {
    events: Arc<dyn EventStore>,
    offsets: Arc<dyn OffsetStore>,
}

impl UploadProcessor {
    /// Creates a processor over the given stores.
    pub fn new(events: Arc<dyn EventStore>, offsets: Arc<dyn OffsetStore>) -> Self {
        Self { events, offsets }
    }

    /// Commits `pending` in order and returns the newly stored events.
    ///
    /// Events already recorded for `(device_id, client_event_id)` are
    /// skipped silently. After each commit the device's offset moves to
    /// the new event id. A store failure aborts the batch; events
    /// committed before it stay committed.
    pub fn process<'a>(
        &self,
        device_id: &str,
        pending: impl IntoIterator<Item = &'a ClientEvent>,
    ) -> StoreResult<Vec<ServerEvent>> {
        let mut appended = Vec::new();
        for event in pending {
            match self.events.append_if_absent(device_id, event)? {
                Some(stored) => {
                    self.offsets.update(device_id, stored.server_event_id)?;
                    appended.push(stored);
                }
                None => trace!(
                    device_id,
                    client_event_id = %event.client_event_id,
                    "skipping resubmitted event"
                ),
            }
        }
        Ok(appended)
    }
}
