//! Download phase: serve the events a device has not yet seen.

use crate::error::StoreResult;
use crate::event_store::EventStore;
use crate::offset_store::OffsetStore;
use pulse_protocol::ServerEvent;
use std::sync::Arc;
use tracing::trace;

/// Reads the backlog past a device's cursor.
///
/// The claimed cursor is recorded in the offset store before the read.
/// It is trusted as-is, so a client that rewinds its cursor simply
/// receives older events again.
#[derive(Clone)]
pub struct DownloadProcessor {
    events: Arc<dyn EventStore>,
    offsets: Arc<dyn OffsetStore>,
}

impl DownloadProcessor {
    /// Creates a processor over the given stores.
    pub fn new(events: Arc<dyn EventStore>, offsets: Arc<dyn OffsetStore>) -> Self {
        Self { events, offsets }
    }

    /// Returns every event with an id greater than `last_known_id`, in
    /// ascending order.
    pub fn process(&self, device_id: &str, last_known_id: i64) -> StoreResult<Vec<ServerEvent>> {
        self.offsets.update(device_id, last_known_id)?;
        let backlog = self.events.list_after(last_known_id)?;
        trace!(device_id, last_known_id, count = backlog.len(), "backlog read");
        Ok(backlog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::InMemoryEventStore;
    use crate::offset_store::InMemoryOffsetStore;
    use pulse_protocol::ClientEvent;

    fn processor() -> (DownloadProcessor, Arc<InMemoryEventStore>, Arc<InMemoryOffsetStore>) {
        let events = Arc::new(InMemoryEventStore::new());
        let offsets = Arc::new(InMemoryOffsetStore::new());
        let processor = DownloadProcessor::new(events.clone(), offsets.clone());
        (processor, events, offsets)
    }

    #[test]
    fn returns_events_past_cursor() {
        let (processor, events, _) = processor();
        for id in ["a", "b", "c"] {
            events.append("other", &ClientEvent::new(id, "t", vec![], 0)).unwrap();
        }

        let backlog = processor.process("dev", 1).unwrap();
        let ids: Vec<i64> = backlog.iter().map(|e| e.server_event_id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn records_claimed_cursor() {
        let (processor, _, offsets) = processor();
        processor.process("dev", 42).unwrap();
        assert_eq!(offsets.get("dev").unwrap(), 42);

        processor.process("dev", 0).unwrap();
        assert_eq!(offsets.get("dev").unwrap(), 0);
    }

    #[test]
    fn cursor_past_end_is_empty() {
        let (processor, events, _) = processor();
        events.append("dev", &ClientEvent::new("a", "t", vec![], 0)).unwrap();
        assert!(processor.process("dev", 99).unwrap().is_empty());
    }
}
