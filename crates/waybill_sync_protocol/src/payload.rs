//! The payload union carried by outbox entries.

use crate::entity::EntityType;
use crate::error::MapError;
use crate::mapper::{
    AssignmentWire, ItemWire, LocationPingWire, PhotoWire, PickupRequestWire, SignatureWire,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A typed snapshot of the fields to send, captured at enqueue time.
///
/// Stored as `{ "entityType": "<tag>", "data": { ... } }`; the `data`
/// object is the exact request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entityType", content = "data", rename_all = "kebab-case")]
pub enum WirePayload {
    /// Pickup request body.
    PickupRequest(PickupRequestWire),
    /// Assignment body.
    Assignment(AssignmentWire),
    /// Item body.
    Item(ItemWire),
    /// Photo body.
    Photo(PhotoWire),
    /// Signature body.
    Signature(SignatureWire),
    /// Location ping body.
    LocationPing(LocationPingWire),
}

impl WirePayload {
    /// The entity type this payload belongs to.
    pub fn entity_type(&self) -> EntityType {
        match self {
            WirePayload::PickupRequest(_) => EntityType::PickupRequest,
            WirePayload::Assignment(_) => EntityType::Assignment,
            WirePayload::Item(_) => EntityType::Item,
            WirePayload::Photo(_) => EntityType::Photo,
            WirePayload::Signature(_) => EntityType::Signature,
            WirePayload::LocationPing(_) => EntityType::LocationPing,
        }
    }

    /// Id of the entity the payload describes.
    pub fn entity_id(&self) -> &str {
        match self {
            WirePayload::PickupRequest(w) => &w.id,
            WirePayload::Assignment(w) => &w.id,
            WirePayload::Item(w) => &w.id,
            WirePayload::Photo(w) => &w.id,
            WirePayload::Signature(w) => &w.id,
            WirePayload::LocationPing(w) => &w.id,
        }
    }

    /// Fails unless the payload belongs to `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::PayloadMismatch`].
    pub fn check_type(&self, expected: EntityType) -> Result<(), MapError> {
        let found = self.entity_type();
        if found == expected {
            Ok(())
        } else {
            Err(MapError::PayloadMismatch { expected, found })
        }
    }

    /// The JSON request body.
    ///
    /// # Errors
    ///
    /// Propagates `serde_json` failures.
    pub fn to_body(&self) -> Result<Value, serde_json::Error> {
        match self {
            WirePayload::PickupRequest(w) => serde_json::to_value(w),
            WirePayload::Assignment(w) => serde_json::to_value(w),
            WirePayload::Item(w) => serde_json::to_value(w),
            WirePayload::Photo(w) => serde_json::to_value(w),
            WirePayload::Signature(w) => serde_json::to_value(w),
            WirePayload::LocationPing(w) => serde_json::to_value(w),
        }
    }
}
