//! Error types for the sync core.

use pulse_protocol::CodecError;
use pulse_storage::StorageError;
use thiserror::Error;

/// Result type for event- and offset-store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for sync exchanges.
pub type ServerResult<T> = Result<T, ServerError>;

/// Failures of a store backing the sync core.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The underlying log backend failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A log record before the tail failed validation.
    #[error("corrupted log record at offset {offset}: {reason}")]
    Corrupted {
        /// Byte offset of the bad record.
        offset: u64,
        /// What was wrong with it.
        reason: String,
    },

    /// A record could not be encoded.
    #[error("record encoding failed: {0}")]
    Encoding(#[from] CodecError),

    /// The store cannot serve requests.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Errors that abort a whole sync exchange.
///
/// Conflicts and duplicate submissions are never errors; they are
/// reported inside the response.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The request carries more pending events than the configured cap.
    #[error("too many pending events: {size} > {limit}")]
    BatchTooLarge {
        /// Pending events in the request.
        size: usize,
        /// Configured maximum.
        limit: usize,
    },

    /// A store failed mid-exchange.
    #[error("store failure: {0}")]
    Store(#[from] StoreError),

    /// The request or response could not be (de)serialized.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Returns true if the client sent something it should fix (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::BatchTooLarge { .. } | ServerError::Codec(_)
        )
    }

    /// Returns true if the server failed; the client may retry the whole
    /// exchange unchanged (5xx).
    pub fn is_server_error(&self) -> bool {
        matches!(self, ServerError::Store(_) | ServerError::Internal(_))
    }
}
