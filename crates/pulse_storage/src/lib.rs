//! # Pulse Storage
//!
//! Append-only byte backends for the Pulse event log.
//!
//! A backend is an **opaque, growing byte sequence**. It knows nothing
//! about events, frames or checksums; the event store in `pulse_server`
//! owns the record format and uses a backend only to append, read back,
//! make durable and cut off a torn tail.
//!
//! ## Available Backends
//!
//! - [`MemoryBackend`] - For tests and ephemeral servers
//! - [`FileBackend`] - A single log file, exclusively locked while open
//!
//! ## Example
//!
//! ```rust
//! use pulse_storage::{LogBackend, MemoryBackend};
//!
//! let mut backend = MemoryBackend::new();
//! let offset = backend.append(b"frame").unwrap();
//! assert_eq!(backend.read_at(offset, 5).unwrap(), b"frame");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod log;
mod memory;

pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use log::LogBackend;
pub use memory::MemoryBackend;
