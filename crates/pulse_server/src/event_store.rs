//! The append-only event log contract and its in-memory implementation.

use crate::error::StoreResult;
use parking_lot::RwLock;
use pulse_protocol::{ClientEvent, ServerEvent};
use std::collections::{HashMap, HashSet};

/// Append-only log of committed events, totally ordered by
/// `server_event_id`.
///
/// # Invariants
///
/// - ids start at 1, strictly increase, and are never reused
/// - the order ids are handed out in is the order `list_after` returns
/// - `list_after` never omits an event whose append completed before the
///   call began
/// - `exists` answers from a dedicated idempotency index keyed by
///   `(device_id, client_event_id)`, not by scanning the log
///
/// Implementations must be safe under concurrent callers; id assignment
/// is their only serialization point.
pub trait EventStore: Send + Sync {
    /// Assigns the next id, persists the resulting [`ServerEvent`] and
    /// records `(device_id, event.client_event_id)` as seen.
    fn append(&self, device_id: &str, event: &ClientEvent) -> StoreResult<ServerEvent>;

    /// All events with `server_event_id > after_id`, ascending.
    fn list_after(&self, after_id: i64) -> StoreResult<Vec<ServerEvent>>;

    /// True iff an append for exactly this pair has succeeded.
    fn exists(&self, device_id: &str, client_event_id: &str) -> StoreResult<bool>;

    /// Appends `event` unless the pair was already committed, returning
    /// the new record or `None` for a resubmission.
    ///
    /// The default is `exists` followed by `append`; implementations
    /// should override it to make the pair atomic.
    fn append_if_absent(
        &self,
        device_id: &str,
        event: &ClientEvent,
    ) -> StoreResult<Option<ServerEvent>> {
        if self.exists(device_id, &event.client_event_id)? {
            return Ok(None);
        }
        self.append(device_id, event).map(Some)
    }

    /// Highest id handed out so far, 0 for an empty log.
    fn latest_id(&self) -> StoreResult<i64>;

    /// Number of committed events.
    fn len(&self) -> StoreResult<usize>;

    /// True if nothing has been committed.
    fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }
}

/// The in-memory view of a log: events in id order plus the idempotency
/// index. Shared by every store implementation in this crate.
#[derive(Debug, Default)]
pub(crate) struct EventIndex {
    events: Vec<ServerEvent>,
    seen: HashMap<String, HashSet<String>>,
}

impl EventIndex {
    pub(crate) fn next_id(&self) -> i64 {
        self.latest_id() + 1
    }

    pub(crate) fn latest_id(&self) -> i64 {
        self.events.last().map_or(0, |e| e.server_event_id)
    }

    pub(crate) fn len(&self) -> usize {
        self.events.len()
    }

    /// Records a committed event. Callers guarantee its id is above
    /// every id already held.
    pub(crate) fn push(&mut self, event: ServerEvent) {
        debug_assert!(event.server_event_id > self.latest_id());
        self.seen
            .entry(event.origin_client_device_id.clone())
            .or_default()
            .insert(event.origin_client_event_id.clone());
        self.events.push(event);
    }

    pub(crate) fn contains(&self, device_id: &str, client_event_id: &str) -> bool {
        self.seen
            .get(device_id)
            .is_some_and(|ids| ids.contains(client_event_id))
    }

    pub(crate) fn after(&self, after_id: i64) -> Vec<ServerEvent> {
        let start = self
            .events
            .partition_point(|e| e.server_event_id <= after_id);
        self.events[start..].to_vec()
    }
}

/// Event store held entirely in memory.
///
/// ```
/// use pulse_protocol::ClientEvent;
/// use pulse_server::{EventStore, InMemoryEventStore};
///
/// let store = InMemoryEventStore::new();
/// let stored = store.append("dev-1", &ClientEvent::new("ce-1", "t", vec![], 0)).unwrap();
/// assert_eq!(stored.server_event_id, 1);
/// assert!(store.exists("dev-1", "ce-1").unwrap());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    index: RwLock<EventIndex>,
}

impl InMemoryEventStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventStore for InMemoryEventStore {
    fn append(&self, device_id: &str, event: &ClientEvent) -> StoreResult<ServerEvent> {
        let mut index = self.index.write();
        let stored = ServerEvent::from_client(index.next_id(), device_id, event);
        index.push(stored.clone());
        Ok(stored)
    }

    fn list_after(&self, after_id: i64) -> StoreResult<Vec<ServerEvent>> {
        Ok(self.index.read().after(after_id))
    }

    fn exists(&self, device_id: &str, client_event_id: &str) -> StoreResult<bool> {
        Ok(self.index.read().contains(device_id, client_event_id))
    }

    fn append_if_absent(
        &self,
        device_id: &str,
        event: &ClientEvent,
    ) -> StoreResult<Option<ServerEvent>> {
        let mut index = self.index.write();
        if index.contains(device_id, &event.client_event_id) {
            return Ok(None);
        }
        let stored = ServerEvent::from_client(index.next_id(), device_id, event);
        index.push(stored.clone());
        Ok(Some(stored))
    }

    fn latest_id(&self) -> StoreResult<i64> {
        Ok(self.index.read().latest_id())
    }

    fn len(&self) -> StoreResult<usize> {
        Ok(self.index.read().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn event(id: &str) -> ClientEvent {
        ClientEvent::new(id, "t", b"data".to_vec(), 0)
    }

    #[test]
    fn empty_store() {
        let store = InMemoryEventStore::new();
        assert_eq!(store.latest_id().unwrap(), 0);
        assert!(store.is_empty().unwrap());
        assert!(store.list_after(0).unwrap().is_empty());
        assert!(!store.exists("dev", "ce").unwrap());
    }

    #[test]
    fn ids_start_at_one_and_interleave_devices() {
        let store = InMemoryEventStore::new();
        store.append("a", &event("1")).unwrap();
        store.append("b", &event("1")).unwrap();
        store.append("a", &event("2")).unwrap();

        let ids: Vec<i64> = store
            .list_after(0)
            .unwrap()
            .iter()
            .map(|e| e.server_event_id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(store.latest_id().unwrap(), 3);
    }

    #[test]
    fn list_after_respects_cursor() {
        let store = InMemoryEventStore::new();
        for i in 0..5 {
            store.append("dev", &event(&format!("ce-{i}"))).unwrap();
        }

        let tail = store.list_after(2).unwrap();
        assert_eq!(tail.len(), 3);
        assert_eq!(tail[0].server_event_id, 3);
        assert!(store.list_after(5).unwrap().is_empty());
        assert!(store.list_after(99).unwrap().is_empty());
        assert_eq!(store.list_after(-1).unwrap().len(), 5);
    }

    #[test]
    fn exists_is_scoped_to_device() {
        let store = InMemoryEventStore::new();
        store.append("dev-1", &event("ce-1")).unwrap();

        assert!(store.exists("dev-1", "ce-1").unwrap());
        assert!(!store.exists("dev-2", "ce-1").unwrap());
        assert!(!store.exists("dev-1", "ce-2").unwrap());
    }

    #[test]
    fn append_if_absent_skips_resubmission() {
        let store = InMemoryEventStore::new();
        let first = store.append_if_absent("dev", &event("ce")).unwrap();
        let second = store.append_if_absent("dev", &event("ce")).unwrap();

        assert_eq!(first.map(|e| e.server_event_id), Some(1));
        assert!(second.is_none());
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn concurrent_appends_get_distinct_consecutive_ids() {
        let store = Arc::new(InMemoryEventStore::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..50 {
                        store.append(&format!("dev-{t}"), &event(&format!("ce-{i}"))).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let ids: Vec<i64> = store
            .list_after(0)
            .unwrap()
            .iter()
            .map(|e| e.server_event_id)
            .collect();
        assert_eq!(ids, (1..=400).collect::<Vec<_>>());
    }

    #[test]
    fn concurrent_resubmissions_commit_once() {
        let store = Arc::new(InMemoryEventStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.append_if_absent("dev", &event("same")).unwrap())
            })
            .collect();
        let committed = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .count();

        assert_eq!(committed, 1);
        assert_eq!(store.len().unwrap(), 1);
    }
}
