//! # Pulse Sync Protocol
//!
//! Wire types and conflict arbitration for the Pulse sync protocol.
//!
//! This crate provides:
//! - [`ClientEvent`] and [`ServerEvent`], the two shapes of an event
//! - [`SyncRequest`] / [`SyncResponse`], the single exchange at the boundary
//! - [`conflict`], the pure arbiter deciding which pending events are admitted
//! - JSON (reference) and CBOR (compact) codecs via [`WireMessage`]
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
pub mod conflict;
mod event;
mod messages;

pub use codec::{CodecError, CodecResult, WireMessage};
pub use conflict::{
    resolve, ConflictPolicy, ConflictResolver, ManifestConflictResolver, Resolution,
    REASON_MANIFEST_OVERLAP, REASON_NEWER_WINS,
};
pub use event::{ClientEvent, ServerEvent};
pub use messages::{SyncRequest, SyncResponse};

/// Sentinel cursor meaning "nothing received yet".
pub const NO_CURSOR: i64 = 0;
