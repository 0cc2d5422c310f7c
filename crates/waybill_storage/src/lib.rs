//! # Waybill Storage
//!
//! Byte-level storage backends underneath the Waybill local store.
//!
//! A backend is an **opaque, append-only byte log**. The local store in
//! `waybill_core` frames its journal records on top of it; backends never
//! look inside those frames.
//!
//! ## Design Principles
//!
//! - Appends are the only way to grow a backend
//! - `sync` is the durability point: nothing is durable before it returns
//! - `rewrite` swaps the whole contents in one step (used for compaction)
//! - Backends are `Send + Sync` so the store can live behind an `Arc`
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - tests and throwaway stores
//! - [`FileBackend`] - the on-device journal file
//!
//! ## Example
//!
//! ```rust
//! use waybill_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"frame").unwrap();
//! backend.sync().unwrap();
//! assert_eq!(backend.read_at(offset, 5).unwrap(), b"frame");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
