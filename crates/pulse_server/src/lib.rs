//! # Pulse Sync Server
//!
//! The authoritative side of the Pulse offline-first sync protocol.
//!
//! This crate provides:
//! - An append-only event log with server-assigned, strictly increasing ids
//! - Per-device idempotency, so resubmitted events commit exactly once
//! - Advisory per-device cursor bookkeeping
//! - The sync exchange pipeline (download, resolve, upload)
//!
//! # Architecture
//!
//! Every client talks to the server through one request/response
//! exchange carrying its unsent events and the last server event id it
//! has seen. The server:
//! 1. Reads everything past that cursor (download)
//! 2. Rejects pending events whose manifest collides with unseen events
//! 3. Appends the rest to the log (upload)
//! 4. Returns the fresh appends followed by the unseen backlog
//!
//! # Storage
//!
//! Stores sit behind the [`EventStore`] and [`OffsetStore`] traits.
//! [`InMemoryEventStore`] keeps everything in process memory;
//! [`LogEventStore`] persists events to a checksummed append-only log
//! through any [`pulse_storage::LogBackend`]:
//!
//! ```rust,no_run
//! use pulse_server::{InMemoryOffsetStore, LogEventStore, ServerConfig, SyncServer};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let events = LogEventStore::open_file(Path::new("/var/lib/pulse/events.log"))?;
//! let server = SyncServer::with_stores(
//!     ServerConfig::default(),
//!     Arc::new(events),
//!     Arc::new(InMemoryOffsetStore::new()),
//! );
//! # Ok::<(), pulse_server::StoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod diastole;
mod error;
mod event_store;
mod handler;
mod log_store;
mod offset_store;
mod server;
mod systole;

pub use config::ServerConfig;
pub use diastole::DownloadProcessor;
pub use error::{ServerError, ServerResult, StoreError, StoreResult};
pub use event_store::{EventStore, InMemoryEventStore};
pub use handler::SyncCoordinator;
pub use log_store::{compute_crc32, encode_frame, read_frames, LogEventStore, FRAME_MAGIC};
pub use offset_store::{InMemoryOffsetStore, OffsetStore, UNKNOWN_OFFSET};
pub use server::SyncServer;
pub use systole::UploadProcessor;
