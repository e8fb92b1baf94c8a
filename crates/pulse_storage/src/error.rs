//! Error types for log backends.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for backend operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by a log backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A read reached past the current end of the log.
    #[error("read beyond end of log: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current log size.
        size: u64,
    },

    /// Truncation target lies beyond the current end of the log.
    #[error("cannot truncate log of {size} bytes to {requested} bytes")]
    TruncatePastEnd {
        /// The requested new size.
        requested: u64,
        /// The current log size.
        size: u64,
    },

    /// Another process holds the log file.
    #[error("log file {0} is locked by another process")]
    Locked(PathBuf),

    /// The backend refused a write (fault injection in tests).
    #[error("write rejected by backend")]
    WriteRejected,
}
