//! # Waybill Sync Protocol
//!
//! Wire-level types shared by the sync engine and its test peers.
//!
//! This crate provides:
//! - [`EntityType`], [`Operation`] and [`Priority`] for outbox entries
//! - [`Route`] resolution from `(entity type, operation)` to a REST call
//! - The `{ success, data, error }` response [`ApiEnvelope`] and [`PullData`]
//! - One [`EntityMapper`] per entity type, plus the [`WirePayload`] union
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod entity;
mod envelope;
mod error;
pub mod mapper;
mod payload;
mod route;
pub mod time;

pub use entity::{EntityType, Operation, Priority};
pub use envelope::{ApiEnvelope, ApiError, PullData};
pub use error::{MapError, ProtocolError, ProtocolResult};
pub use mapper::{decode_entity, DecodedEntity, EntityMapper};
pub use payload::WirePayload;
pub use route::{HttpMethod, Route, PULL_PATH};
