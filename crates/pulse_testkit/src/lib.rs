//! # Pulse Testkit
//!
//! Test utilities for Pulse.
//!
//! This crate provides:
//! - Test servers with automatic cleanup, in memory or over a log file
//! - A simulated client with an outbox, a projection and a cursor
//! - Property-based test generators using proptest
//! - Stress testing utilities
//! - Crash recovery harnesses for the event log
//! - Fuzz testing harnesses
//!
//! ## Usage
//!
//! ```rust
//! use pulse_testkit::prelude::*;
//!
//! let server = TestServer::memory();
//! let mut phone = TestClient::new("phone");
//! phone.record(&["doc-1"]);
//! phone.sync(&server).unwrap();
//! assert_eq!(phone.cursor(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod fuzz;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::fuzz::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use crash::*;
pub use fixtures::*;
pub use fuzz::*;
pub use generators::*;
pub use stress::*;
