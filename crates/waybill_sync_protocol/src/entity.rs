//! Entity types, operations and priorities.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kinds of domain entity the mobile client creates offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityType {
    /// A customer's request for goods to be collected.
    PickupRequest,
    /// A driver assigned to a pickup request.
    Assignment,
    /// A parcel collected under a pickup request.
    Item,
    /// A proof-of-pickup photo.
    Photo,
    /// A signature captured at pickup.
    Signature,
    /// A periodic driver location report.
    LocationPing,
}

impl EntityType {
    /// Every entity type, in the order pulled changes are applied.
    ///
    /// Parents come before the records that reference them.
    pub const ALL: [EntityType; 6] = [
        EntityType::PickupRequest,
        EntityType::Assignment,
        EntityType::Item,
        EntityType::Photo,
        EntityType::Signature,
        EntityType::LocationPing,
    ];

    /// The kebab-case tag used on the wire and as the local table name.
    pub fn tag(self) -> &'static str {
        match self {
            EntityType::PickupRequest => "pickup-request",
            EntityType::Assignment => "assignment",
            EntityType::Item => "item",
            EntityType::Photo => "photo",
            EntityType::Signature => "signature",
            EntityType::LocationPing => "location-ping",
        }
    }

    /// REST collection path for this entity type.
    pub fn base_path(self) -> &'static str {
        match self {
            EntityType::PickupRequest => "/pickup-requests",
            EntityType::Assignment => "/assignments",
            EntityType::Item => "/items",
            EntityType::Photo => "/photos",
            EntityType::Signature => "/signatures",
            EntityType::LocationPing => "/location-pings",
        }
    }

    /// Priority used when a caller does not pick one.
    pub fn default_priority(self) -> Priority {
        match self {
            EntityType::PickupRequest | EntityType::Assignment => Priority::HIGH,
            EntityType::Item | EntityType::Photo | EntityType::Signature => Priority::MEDIUM,
            EntityType::LocationPing => Priority::LOW,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for EntityType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .into_iter()
            .find(|t| t.tag() == s)
            .ok_or_else(|| ProtocolError::UnknownEntityType(s.to_string()))
    }
}

/// The kind of mutation an outbox entry carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// The entity does not exist on the server yet.
    Create,
    /// The entity exists and its fields changed.
    Update,
    /// The entity was removed.
    Delete,
}

impl Operation {
    /// Returns true if the operation carries a payload.
    pub fn has_payload(self) -> bool {
        !matches!(self, Operation::Delete)
    }

    /// Lowercase name, as stored and logged.
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery priority. Lower values are pushed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Priority(pub u8);

impl Priority {
    /// Business-critical records.
    pub const HIGH: Priority = Priority(1);
    /// Supporting records.
    pub const MEDIUM: Priority = Priority(5);
    /// Telemetry.
    pub const LOW: Priority = Priority(10);

    /// Raw value.
    pub fn value(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip_through_from_str() {
        for entity_type in EntityType::ALL {
            assert_eq!(entity_type.tag().parse::<EntityType>().unwrap(), entity_type);
        }
        assert!("branch".parse::<EntityType>().is_err());
    }

    #[test]
    fn serde_uses_kebab_case_tags() {
        let json = serde_json::to_string(&EntityType::PickupRequest).unwrap();
        assert_eq!(json, "\"pickup-request\"");
        let back: EntityType = serde_json::from_str("\"location-ping\"").unwrap();
        assert_eq!(back, EntityType::LocationPing);
    }

    #[test]
    fn default_priorities() {
        assert_eq!(EntityType::PickupRequest.default_priority(), Priority::HIGH);
        assert_eq!(EntityType::Photo.default_priority(), Priority::MEDIUM);
        assert_eq!(EntityType::LocationPing.default_priority(), Priority::LOW);
        assert!(Priority::HIGH < Priority::MEDIUM);
    }

    #[test]
    fn only_delete_has_no_payload() {
        assert!(Operation::Create.has_payload());
        assert!(Operation::Update.has_payload());
        assert!(!Operation::Delete.has_payload());
        assert_eq!(serde_json::to_string(&Operation::Update).unwrap(), "\"update\"");
    }
}
