//! Per-device cursor bookkeeping.
//!
//! Offsets are advisory: they record how far each device has been served
//! or has written, and nothing in the sync path reads them back to make a
//! decision. Last write wins.

use crate::error::StoreResult;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// Offset reported for a device that has never been recorded.
pub const UNKNOWN_OFFSET: i64 = -1;

/// Storage for the last known server event id per device.
pub trait OffsetStore: Send + Sync {
    /// Returns the recorded offset, or [`UNKNOWN_OFFSET`].
    fn get(&self, device_id: &str) -> StoreResult<i64>;

    /// Records `offset` for the device, replacing any previous value.
    fn update(&self, device_id: &str, offset: i64) -> StoreResult<()>;

    /// All recorded offsets, ordered by device id.
    fn snapshot(&self) -> StoreResult<BTreeMap<String, i64>>;
}

/// Process-local [`OffsetStore`].
#[derive(Debug, Default)]
pub struct InMemoryOffsetStore {
    offsets: RwLock<HashMap<String, i64>>,
}

impl InMemoryOffsetStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl OffsetStore for InMemoryOffsetStore {
    fn get(&self, device_id: &str) -> StoreResult<i64> {
        Ok(self
            .offsets
            .read()
            .get(device_id)
            .copied()
            .unwrap_or(UNKNOWN_OFFSET))
    }

    fn update(&self, device_id: &str, offset: i64) -> StoreResult<()> {
        self.offsets.write().insert(device_id.to_string(), offset);
        Ok(())
    }

    fn snapshot(&self) -> StoreResult<BTreeMap<String, i64>> {
        Ok(self
            .offsets
            .read()
            .iter()
            .map(|(device, offset)| (device.clone(), *offset))
            .collect())
    }
}
