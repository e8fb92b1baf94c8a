//! In-memory log backend.

use crate::error::{StorageError, StorageResult};
use crate::log::LogBackend;

/// A log held entirely in memory.
///
/// Nothing survives the process, which makes it the default for tests
/// and for servers that rebuild state from clients. Writes can be made
/// to fail on demand to exercise store-failure paths.
///
/// ```rust
/// use pulse_storage::{LogBackend, MemoryBackend};
///
/// let mut backend = MemoryBackend::new();
/// assert_eq!(backend.append(b"abc").unwrap(), 0);
/// assert_eq!(backend.append(b"de").unwrap(), 3);
/// assert_eq!(backend.size(), 5);
/// ```
#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
    bytes: Vec<u8>,
    reject_writes: bool,
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend that starts with `bytes`, e.g. a captured log.
    #[must_use]
    pub fn with_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            reject_writes: false,
        }
    }

    /// Returns the raw log contents.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Makes subsequent appends and syncs fail with
    /// [`StorageError::WriteRejected`].
    pub fn set_reject_writes(&mut self, reject: bool) {
        self.reject_writes = reject;
    }
}

impl LogBackend for MemoryBackend {
    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        if self.reject_writes {
            return Err(StorageError::WriteRejected);
        }
        let offset = self.bytes.len() as u64;
        self.bytes.extend_from_slice(bytes);
        Ok(offset)
    }

    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let size = self.bytes.len() as u64;
        let end = offset.saturating_add(len as u64);
        if end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }
        Ok(self.bytes[offset as usize..end as usize].to_vec())
    }

    fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn sync(&mut self) -> StorageResult<()> {
        if self.reject_writes {
            return Err(StorageError::WriteRejected);
        }
        Ok(())
    }

    fn truncate(&mut self, size: u64) -> StorageResult<()> {
        let current = self.size();
        if size > current {
            return Err(StorageError::TruncatePastEnd {
                requested: size,
                size: current,
            });
        }
        self.bytes.truncate(size as usize);
        Ok(())
    }
}
