//! # Waybill Testkit
//!
//! Test utilities for the Waybill sync engine.
//!
//! This crate provides:
//! - Store and engine fixtures ([`TestStore`], [`test_engine`])
//! - [`FakeServer`], an in-process REST peer with failure injection
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use waybill_testkit::prelude::*;
//!
//! let server = FakeServer::new();
//! let store = TestStore::memory();
//! let engine = test_engine(&store, &server);
//! assert!(engine.outbox().is_empty());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod server;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::server::*;
}

pub use fixtures::*;
pub use generators::*;
pub use server::*;
