//! # Waybill Core
//!
//! The on-device record store used by the Waybill sync engine.
//!
//! Records are JSON documents grouped into named tables and addressed by
//! string id. Every change goes through [`LocalStore::transaction`], which
//! commits all of its writes as one journal frame or none of them.
//!
//! ## Journal
//!
//! ```text
//! <store dir>/
//! ├─ LOCK          # advisory lock, one process per store
//! └─ journal.log   # append-only frames, replayed on open
//! ```
//!
//! Each frame is `magic | version | length | CBOR body | crc32`. A frame
//! torn by a crash fails its checksum on replay and is cut off, so the
//! store always reopens at the last fully committed transaction.
//!
//! ## Example
//!
//! ```rust
//! use waybill_core::LocalStore;
//! use serde_json::json;
//!
//! let store = LocalStore::open_in_memory().unwrap();
//! store
//!     .transaction(|txn| {
//!         txn.put("branches", "br-1", json!({ "name": "North" }));
//!         Ok::<_, waybill_core::CoreError>(())
//!     })
//!     .unwrap();
//! assert!(store.contains("branches", "br-1"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod dir;
mod error;
mod journal;
mod store;
mod transaction;

pub use config::StoreConfig;
pub use dir::StoreDir;
pub use error::{CoreError, CoreResult};
pub use journal::{compute_crc32, JournalFrame, WriteOp, FRAME_MAGIC, FRAME_VERSION};
pub use store::{LocalStore, StoreStats};
pub use transaction::Transaction;

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
