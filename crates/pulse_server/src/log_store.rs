//! Durable event store over an append-only byte log.
//!
//! ## Record format
//!
//! Each committed event is one frame:
//!
//! | Field    | Size | Description                      |
//! |----------|------|----------------------------------|
//! | magic    | 4    | `PLSE`                           |
//! | length   | 4    | body length, little-endian u32   |
//! | body     | var  | CBOR-encoded [`ServerEvent`]     |
//! | checksum | 4    | CRC32 of the body, little-endian |
//!
//! On open the log is replayed to rebuild the id counter and the
//! idempotency index. A torn or corrupt final frame is the footprint of a
//! crash mid-append and is cut off; damage anywhere else is reported as
//! [`StoreError::Corrupted`].

use crate::error::{StoreError, StoreResult};
use crate::event_store::{EventIndex, EventStore};
use parking_lot::{Mutex, RwLock};
use pulse_protocol::{ClientEvent, ServerEvent, WireMessage};
use pulse_storage::{FileBackend, LogBackend};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, warn};

/// Magic bytes opening every frame.
pub const FRAME_MAGIC: [u8; 4] = *b"PLSE";

const HEADER_LEN: u64 = 8;
const TRAILER_LEN: u64 = 4;

/// An [`EventStore`] persisted through a [`LogBackend`].
///
/// All events are also kept in memory for reads; the backend is only
/// touched on append and on open.
///
/// If a failed append cannot be rolled back, its frame may still be in
/// the log under an id the index never published. The store then
/// refuses further appends with [`StoreError::Unavailable`] until it is
/// reopened, and replay decides whether that frame survived.
pub struct LogEventStore<B: LogBackend> {
    backend: Mutex<B>,
    index: RwLock<EventIndex>,
    sync_on_append: bool,
    poisoned: AtomicBool,
}

impl LogEventStore<FileBackend> {
    /// Opens (or creates) a log file and replays it.
    pub fn open_file(path: &Path) -> StoreResult<Self> {
        Self::open(FileBackend::open(path)?)
    }
}

impl<B: LogBackend> LogEventStore<B> {
    /// Replays `backend` and returns a store ready for appends.
    ///
    /// Appends are synced to durable storage before they are published;
    /// see [`LogEventStore::sync_on_append`].
    pub fn open(mut backend: B) -> StoreResult<Self> {
        let index = replay(&mut backend)?;
        debug!(
            events = index.len(),
            latest_id = index.latest_id(),
            bytes = backend.size(),
            "event log replayed"
        );
        Ok(Self {
            backend: Mutex::new(backend),
            index: RwLock::new(index),
            sync_on_append: true,
            poisoned: AtomicBool::new(false),
        })
    }

    /// Whether each append is synced before it is acknowledged.
    pub fn sync_on_append(mut self, sync: bool) -> Self {
        self.sync_on_append = sync;
        self
    }

    /// Whether appends are refused until the log is reopened.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }

    /// Size of the log in bytes.
    pub fn log_size(&self) -> u64 {
        self.backend.lock().size()
    }

    /// Consumes the store, returning its backend.
    pub fn into_backend(self) -> B {
        self.backend.into_inner()
    }

    /// Writes one event while holding the backend lock. The event only
    /// becomes visible once the frame is durable.
    fn append_locked(
        &self,
        backend: &mut B,
        device_id: &str,
        event: &ClientEvent,
    ) -> StoreResult<ServerEvent> {
        if self.is_poisoned() {
            return Err(StoreError::Unavailable(
                "an earlier append could not be rolled back; reopen the log".into(),
            ));
        }

        let stored = ServerEvent::from_client(self.index.read().next_id(), device_id, event);
        let frame = encode_frame(&stored)?;

        let offset = backend.append(&frame)?;
        if self.sync_on_append {
            if let Err(err) = backend.sync() {
                if let Err(rollback) = backend.truncate(offset) {
                    error!(
                        offset,
                        event_id = stored.server_event_id,
                        %rollback,
                        "failed to roll back unsynced frame; refusing appends"
                    );
                    self.poisoned.store(true, Ordering::Release);
                }
                return Err(err.into());
            }
        }

        self.index.write().push(stored.clone());
        Ok(stored)
    }
}

impl<B: LogBackend> EventStore for LogEventStore<B> {
    fn append(&self, device_id: &str, event: &ClientEvent) -> StoreResult<ServerEvent> {
        let mut backend = self.backend.lock();
        self.append_locked(&mut backend, device_id, event)
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
        let mut backend = self.backend.lock();
        if self.index.read().contains(device_id, &event.client_event_id) {
            return Ok(None);
        }
        self.append_locked(&mut backend, device_id, event).map(Some)
    }

    fn latest_id(&self) -> StoreResult<i64> {
        Ok(self.index.read().latest_id())
    }

    fn len(&self) -> StoreResult<usize> {
        Ok(self.index.read().len())
    }
}

/// Encodes `event` as a complete frame.
pub fn encode_frame(event: &ServerEvent) -> StoreResult<Vec<u8>> {
    let body = event.encode_cbor()?;
    let len = u32::try_from(body.len())
        .map_err(|_| StoreError::Unavailable(format!("event of {} bytes", body.len())))?;

    let mut frame = Vec::with_capacity(body.len() + (HEADER_LEN + TRAILER_LEN) as usize);
    frame.extend_from_slice(&FRAME_MAGIC);
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&body);
    frame.extend_from_slice(&compute_crc32(&body).to_le_bytes());
    Ok(frame)
}

/// Reads every frame in `backend`, in order.
///
/// Stops cleanly at a torn tail, leaving it in place; `replay` is the
/// one that cuts it off.
pub fn read_frames<B: LogBackend + ?Sized>(
    backend: &B,
) -> StoreResult<(Vec<(u64, ServerEvent)>, Option<u64>)> {
    let size = backend.size();
    let mut offset = 0u64;
    let mut frames = Vec::new();

    while offset < size {
        match read_frame(backend, offset, size)? {
            Frame::Complete { event, next } => {
                frames.push((offset, event));
                offset = next;
            }
            Frame::Torn => return Ok((frames, Some(offset))),
        }
    }

    Ok((frames, None))
}

enum Frame {
    Complete { event: ServerEvent, next: u64 },
    Torn,
}

fn read_frame<B: LogBackend + ?Sized>(backend: &B, offset: u64, size: u64) -> StoreResult<Frame> {
    if size - offset < HEADER_LEN {
        return Ok(Frame::Torn);
    }

    let header = backend.read_at(offset, HEADER_LEN as usize)?;
    if header[..4] != FRAME_MAGIC {
        return Err(StoreError::Corrupted {
            offset,
            reason: "bad frame magic".into(),
        });
    }

    let body_len = u64::from(u32::from_le_bytes([header[4], header[5], header[6], header[7]]));
    let next = offset + HEADER_LEN + body_len + TRAILER_LEN;
    if next > size {
        return Ok(Frame::Torn);
    }

    let body = backend.read_at(offset + HEADER_LEN, body_len as usize)?;
    let trailer = backend.read_at(offset + HEADER_LEN + body_len, TRAILER_LEN as usize)?;
    let expected = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);

    if compute_crc32(&body) != expected {
        if next == size {
            return Ok(Frame::Torn);
        }
        return Err(StoreError::Corrupted {
            offset,
            reason: "checksum mismatch".into(),
        });
    }

    let event = ServerEvent::decode_cbor(&body).map_err(|e| StoreError::Corrupted {
        offset,
        reason: e.to_string(),
    })?;

    Ok(Frame::Complete { event, next })
}

fn replay<B: LogBackend>(backend: &mut B) -> StoreResult<EventIndex> {
    let (frames, torn_at) = read_frames(&*backend)?;

    let mut index = EventIndex::default();
    for (offset, event) in frames {
        if event.server_event_id <= index.latest_id() {
            return Err(StoreError::Corrupted {
                offset,
                reason: format!(
                    "event id {} does not follow {}",
                    event.server_event_id,
                    index.latest_id()
                ),
            });
        }
        index.push(event);
    }

    if let Some(offset) = torn_at {
        warn!(
            offset,
            dropped_bytes = backend.size() - offset,
            "truncating torn tail of event log"
        );
        backend.truncate(offset)?;
    }

    Ok(index)
}

/// CRC32 (IEEE polynomial) of `data`.
pub fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    !data.iter().fold(0xFFFF_FFFF_u32, |crc, &byte| {
        (crc >> 8) ^ TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_storage::{MemoryBackend, StorageError, StorageResult};
    use tempfile::tempdir;

    fn event(id: &str, manifest: &[&str]) -> ClientEvent {
        ClientEvent::new(id, "t", id.as_bytes().to_vec(), 7).with_manifest(manifest.iter().copied())
    }

    fn reopen(store: LogEventStore<MemoryBackend>) -> LogEventStore<MemoryBackend> {
        let bytes = store.into_backend().bytes().to_vec();
        LogEventStore::open(MemoryBackend::with_bytes(bytes)).unwrap()
    }

    #[test]
    fn crc32_known_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_crc32(b""), 0);
    }

    #[test]
    fn replay_restores_events_and_index() {
        let store = LogEventStore::open(MemoryBackend::new()).unwrap();
        store.append("dev-1", &event("a", &["R"])).unwrap();
        store.append("dev-2", &event("b", &[])).unwrap();

        let store = reopen(store);

        let events = store.list_after(0).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].payload_manifest, vec!["R"]);
        assert!(store.exists("dev-1", "a").unwrap());
        assert!(store.exists("dev-2", "b").unwrap());
        assert_eq!(store.append("dev-1", &event("c", &[])).unwrap().server_event_id, 3);
    }

    #[test]
    fn torn_tail_is_truncated() {
        let store = LogEventStore::open(MemoryBackend::new()).unwrap();
        store.append("dev", &event("a", &[])).unwrap();
        let good_size = store.log_size();
        store.append("dev", &event("b", &[])).unwrap();

        let mut bytes = store.into_backend().bytes().to_vec();
        bytes.truncate(bytes.len() - 3);

        let store = LogEventStore::open(MemoryBackend::with_bytes(bytes)).unwrap();
        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.log_size(), good_size);
        assert!(!store.exists("dev", "b").unwrap());
        assert_eq!(store.append("dev", &event("b", &[])).unwrap().server_event_id, 2);
    }

    #[test]
    fn corrupt_checksum_on_tail_is_dropped() {
        let store = LogEventStore::open(MemoryBackend::new()).unwrap();
        store.append("dev", &event("a", &[])).unwrap();

        let mut bytes = store.into_backend().bytes().to_vec();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        let store = LogEventStore::open(MemoryBackend::with_bytes(bytes)).unwrap();
        assert!(store.is_empty().unwrap());
        assert_eq!(store.log_size(), 0);
    }

    #[test]
    fn corruption_before_tail_is_an_error() {
        let store = LogEventStore::open(MemoryBackend::new()).unwrap();
        store.append("dev", &event("a", &[])).unwrap();
        store.append("dev", &event("b", &[])).unwrap();

        let mut bytes = store.into_backend().bytes().to_vec();
        bytes[HEADER_LEN as usize] ^= 0xFF;

        let result = LogEventStore::open(MemoryBackend::with_bytes(bytes));
        assert!(matches!(
            result,
            Err(StoreError::Corrupted { offset: 0, .. })
        ));
    }

    #[test]
    fn bad_magic_is_an_error() {
        let result = LogEventStore::open(MemoryBackend::with_bytes(b"NOPE\0\0\0\0".to_vec()));
        assert!(matches!(result, Err(StoreError::Corrupted { .. })));
    }

    #[test]
    fn failed_write_publishes_nothing() {
        let mut backend = MemoryBackend::new();
        backend.set_reject_writes(true);
        let store = LogEventStore::open(backend).unwrap();

        assert!(store.append("dev", &event("a", &[])).is_err());
        assert!(!store.exists("dev", "a").unwrap());
        assert_eq!(store.latest_id().unwrap(), 0);
    }

    /// Fails the next `sync_failures` syncs and, while `stuck` is set,
    /// every truncate.
    struct StuckBackend {
        inner: MemoryBackend,
        sync_failures: usize,
        stuck: bool,
    }

    impl LogBackend for StuckBackend {
        fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
            self.inner.append(bytes)
        }

        fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
            self.inner.read_at(offset, len)
        }

        fn size(&self) -> u64 {
            self.inner.size()
        }

        fn sync(&mut self) -> StorageResult<()> {
            if self.sync_failures > 0 {
                self.sync_failures -= 1;
                return Err(StorageError::WriteRejected);
            }
            Ok(())
        }

        fn truncate(&mut self, size: u64) -> StorageResult<()> {
            if self.stuck {
                return Err(StorageError::WriteRejected);
            }
            self.inner.truncate(size)
        }
    }

    #[test]
    fn failed_rollback_refuses_appends_until_reopen() {
        let store = LogEventStore::open(StuckBackend {
            inner: MemoryBackend::new(),
            sync_failures: 1,
            stuck: true,
        })
        .unwrap();

        assert!(store.append("dev", &event("a", &[])).is_err());
        assert!(store.is_poisoned());
        assert!(matches!(
            store.append("dev", &event("b", &[])),
            Err(StoreError::Unavailable(_))
        ));
        assert!(matches!(
            store.append_if_absent("dev", &event("b", &[])),
            Err(StoreError::Unavailable(_))
        ));
        assert_eq!(store.latest_id().unwrap(), 0);

        // The orphan frame is whole, so replay keeps it and numbering
        // continues after it.
        let mut backend = store.into_backend();
        backend.stuck = false;
        let store = LogEventStore::open(backend).unwrap();
        assert!(!store.is_poisoned());
        assert!(store.exists("dev", "a").unwrap());
        assert!(store.append_if_absent("dev", &event("a", &[])).unwrap().is_none());
        assert_eq!(store.append("dev", &event("b", &[])).unwrap().server_event_id, 2);
    }

    #[test]
    fn failed_sync_with_working_rollback_keeps_serving() {
        let store = LogEventStore::open(StuckBackend {
            inner: MemoryBackend::new(),
            sync_failures: 1,
            stuck: false,
        })
        .unwrap();

        assert!(store.append("dev", &event("a", &[])).is_err());
        assert!(!store.is_poisoned());
        assert_eq!(store.log_size(), 0);
        assert_eq!(store.append("dev", &event("a", &[])).unwrap().server_event_id, 1);
    }

    #[test]
    fn file_log_survives_restart() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.log");

        {
            let store = LogEventStore::open_file(&path).unwrap();
            assert!(store.append_if_absent("dev", &event("a", &["R"])).unwrap().is_some());
            assert!(store.append_if_absent("dev", &event("a", &["R"])).unwrap().is_none());
        }

        let store = LogEventStore::open_file(&path).unwrap();
        assert_eq!(store.len().unwrap(), 1);
        assert!(store.append_if_absent("dev", &event("a", &["R"])).unwrap().is_none());
        assert_eq!(store.append("dev", &event("b", &[])).unwrap().server_event_id, 2);
    }

    #[test]
    fn read_frames_reports_offsets() {
        let store = LogEventStore::open(MemoryBackend::new()).unwrap();
        store.append("dev", &event("a", &[])).unwrap();
        let second_offset = store.log_size();
        store.append("dev", &event("b", &[])).unwrap();

        let backend = store.into_backend();
        let (frames, torn) = read_frames(&backend).unwrap();
        assert!(torn.is_none());
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].0, 0);
        assert_eq!(frames[1].0, second_offset);
        assert_eq!(frames[1].1.origin_client_event_id, "b");
    }
}
