//! Entity mappers.
//!
//! Every translation between the server's wire shape and the shape kept in
//! the local store lives in this module: field renames, unit and format
//! conversions, and defaults for optional fields. Nothing else in the
//! workspace looks inside an entity body.

mod assignment;
mod item;
mod location_ping;
mod photo;
mod pickup_request;
mod signature;

pub use assignment::{Assignment, AssignmentMapper, AssignmentWire};
pub use item::{Dimensions, Item, ItemMapper, ItemWire};
pub use location_ping::{Coords, LocationPing, LocationPingMapper, LocationPingWire};
pub use photo::{GeoPoint, Photo, PhotoMapper, PhotoWire};
pub use pickup_request::{PickupAddress, PickupRequest, PickupRequestMapper, PickupRequestWire};
pub use signature::{Signature, SignatureMapper, SignatureWire};

use crate::entity::EntityType;
use crate::error::MapError;
use crate::payload::WirePayload;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Debug;

/// Bidirectional transform for one entity type.
pub trait EntityMapper {
    /// Shape sent to and received from the server.
    type Wire: Serialize + DeserializeOwned + Clone + Debug + PartialEq;
    /// Shape kept in the local store.
    type Local: Serialize + DeserializeOwned + Clone + Debug + PartialEq;
    /// The entity type this mapper handles.
    const ENTITY_TYPE: EntityType;

    /// Converts a server entity into its local shape.
    fn to_local(wire: Self::Wire) -> Result<Self::Local, MapError>;

    /// Converts a local entity into the payload sent to the server.
    fn to_wire(local: &Self::Local) -> Self::Wire;

    /// Identifier of a local entity.
    fn local_id(local: &Self::Local) -> &str;

    /// Wraps a wire entity into the payload union.
    fn into_payload(wire: Self::Wire) -> WirePayload;
}

/// A server entity decoded for the local store.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedEntity {
    /// Insert or replace the local record.
    Upsert {
        /// Entity id.
        id: String,
        /// Local-shape body.
        local: Value,
    },
    /// The server deleted the entity.
    Tombstone {
        /// Entity id.
        id: String,
    },
}

impl DecodedEntity {
    /// Entity id.
    pub fn id(&self) -> &str {
        match self {
            DecodedEntity::Upsert { id, .. } | DecodedEntity::Tombstone { id } => id,
        }
    }
}

/// Decodes a server entity of `entity_type` into its local shape.
///
/// Entities with a non-null `deletedAt` are tombstones and only need an id.
///
/// # Errors
///
/// Returns a [`MapError`] if the entity does not match its wire shape or a
/// conversion fails.
pub fn decode_entity(entity_type: EntityType, value: Value) -> Result<DecodedEntity, MapError> {
    if value.get("deletedAt").is_some_and(|v| !v.is_null()) {
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| MapError::invalid("id", "tombstone without a string id"))?;
        require_id(id)?;
        return Ok(DecodedEntity::Tombstone { id: id.to_string() });
    }

    match entity_type {
        EntityType::PickupRequest => decode_with::<PickupRequestMapper>(value),
        EntityType::Assignment => decode_with::<AssignmentMapper>(value),
        EntityType::Item => decode_with::<ItemMapper>(value),
        EntityType::Photo => decode_with::<PhotoMapper>(value),
        EntityType::Signature => decode_with::<SignatureMapper>(value),
        EntityType::LocationPing => decode_with::<LocationPingMapper>(value),
    }
}

fn decode_with<M: EntityMapper>(value: Value) -> Result<DecodedEntity, MapError> {
    let decode_err = |source| MapError::Decode {
        entity_type: M::ENTITY_TYPE,
        source,
    };
    let wire: M::Wire = serde_json::from_value(value).map_err(decode_err)?;
    let local = M::to_local(wire)?;
    let id = M::local_id(&local).to_string();
    let local = serde_json::to_value(&local).map_err(decode_err)?;
    Ok(DecodedEntity::Upsert { id, local })
}

pub(crate) fn require_id(id: &str) -> Result<(), MapError> {
    if id.trim().is_empty() {
        return Err(MapError::invalid("id", "must not be empty"));
    }
    Ok(())
}

pub(crate) fn grams_to_kg(grams: u64) -> f64 {
    grams as f64 / 1_000.0
}

pub(crate) fn kg_to_grams(kg: f64) -> u64 {
    (kg * 1_000.0).round().max(0.0) as u64
}

pub(crate) fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deleted_entities_become_tombstones() {
        let decoded = decode_entity(
            EntityType::Item,
            json!({ "id": "it-1", "deletedAt": "2024-03-01T10:00:00Z" }),
        )
        .unwrap();
        assert_eq!(decoded, DecodedEntity::Tombstone { id: "it-1".into() });
    }

    #[test]
    fn null_deleted_at_is_a_live_entity() {
        let decoded = decode_entity(
            EntityType::Signature,
            json!({
                "id": "sg-1",
                "pickupRequestId": "pr-1",
                "signerName": "Ana",
                "imageData": "aGk=",
                "signedAt": "2024-03-01T10:00:00Z",
                "deletedAt": null
            }),
        )
        .unwrap();
        assert_eq!(decoded.id(), "sg-1");
        assert!(matches!(decoded, DecodedEntity::Upsert { .. }));
    }

    #[test]
    fn shape_mismatch_names_the_entity_type() {
        let err = decode_entity(EntityType::Assignment, json!({ "id": 7 })).unwrap_err();
        assert!(err.to_string().starts_with("cannot decode assignment"));
    }

    #[test]
    fn tombstone_needs_an_id() {
        assert!(decode_entity(EntityType::Photo, json!({ "deletedAt": "x" })).is_err());
    }

    #[test]
    fn weight_conversions() {
        assert_eq!(grams_to_kg(1_250), 1.25);
        assert_eq!(kg_to_grams(1.25), 1_250);
        assert_eq!(kg_to_grams(-3.0), 0);
    }
}
