//! # Waybill Sync Engine
//!
//! Offline-first synchronization for the Waybill courier client.
//!
//! This crate provides:
//! - A durable, coalescing [`Outbox`] of pending mutations
//! - The [`PushWorker`] that drains the outbox in priority order
//! - The [`PullReconciler`] that applies server changes since a [`Watermark`]
//! - [`SyncEngine`], which ties both to one single-flight guard
//! - [`SyncTrigger`], which schedules runs on interval, reconnect and enqueue
//! - An HTTP transport over `reqwest`
//!
//! ## Architecture
//!
//! Local writes never wait for the network:
//! 1. `save_local` writes the record and its outbox entry in one transaction
//! 2. A push run sends entries one by one and marks accepted records synced
//! 3. A pull run fetches changes after the watermark and upserts them
//!
//! ## Key Invariants
//!
//! - An entry leaves the outbox only after the server accepts it
//! - At most one sync run is active at a time
//! - The watermark only moves after a whole pull is applied
//! - Entries that hit the retry cap stay put until an operator resets them

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod auth;
mod config;
mod engine;
mod error;
mod flight;
mod http;
mod outbox;
mod pull;
mod push;
mod records;
mod tables;
#[cfg(test)]
mod test_support;
mod transport;
mod trigger;
mod watermark;

pub use auth::{StaticToken, TokenProvider};
pub use config::SyncConfig;
pub use engine::{CycleReport, SyncEngine, SyncState, SyncStats};
pub use error::{FailureKind, SyncError, SyncResult};
pub use flight::{FlightGuard, RunOutcome, SingleFlight};
pub use http::{HttpClient, HttpRequest, HttpResponse, HttpTransport, ReqwestClient};
pub use outbox::{coalesce, EnqueueOutcome, Outbox, OutboxEntry};
pub use pull::{PullReconciler, PullReport};
pub use push::{EntryFailure, EntryOutcome, PushReport, PushWorker};
pub use records::{table_for, RecordEnvelope, Records};
pub use tables::{OUTBOX_INDEX_TABLE, OUTBOX_TABLE, PULL_DEFERRED_TABLE, SYNC_META_TABLE};
pub use transport::{MockTransport, SyncTransport};
pub use trigger::SyncTrigger;
pub use watermark::Watermark;
