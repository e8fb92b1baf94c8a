//! The backend trait.

use crate::error::StorageResult;

/// An append-only byte log.
///
/// # Invariants
///
/// - `append` writes at the current end and returns that offset; a
///   failed `append` leaves no bytes behind for the next one to trip over
/// - `read_at` returns exactly the bytes previously appended there
/// - after `sync` returns, every appended byte survives a crash
/// - `truncate` only ever shortens the log (torn-tail recovery)
///
/// Callers serialize access themselves; the trait takes `&mut self` for
/// every mutation and backends carry no internal locking.
pub trait LogBackend: Send {
    /// Appends `bytes` at the end of the log, returning their offset.
    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64>;

    /// Reads `len` bytes starting at `offset`.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Current size of the log in bytes.
    fn size(&self) -> u64;

    /// Makes every appended byte durable.
    fn sync(&mut self) -> StorageResult<()>;

    /// Cuts the log back to `size` bytes.
    fn truncate(&mut self, size: u64) -> StorageResult<()>;
}

impl<B: LogBackend + ?Sized> LogBackend for Box<B> {
    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        (**self).append(bytes)
    }

    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        (**self).read_at(offset, len)
    }

    fn size(&self) -> u64 {
        (**self).size()
    }

    fn sync(&mut self) -> StorageResult<()> {
        (**self).sync()
    }

    fn truncate(&mut self, size: u64) -> StorageResult<()> {
        (**self).truncate(size)
    }
}
