use super::{grams_to_kg, kg_to_grams, non_empty, require_id, EntityMapper};
use crate::entity::EntityType;
use crate::error::MapError;
use crate::payload::WirePayload;
use crate::time::{format_iso_millis, parse_iso_millis};
use serde::{Deserialize, Serialize};

/// Status assigned to a pickup request the server sent without one.
pub const DEFAULT_PICKUP_STATUS: &str = "pending";

/// Nested address as the server sends it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickupAddress {
    /// Street and number.
    pub street: String,
    /// City.
    pub city: String,
    /// Postal code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    /// Province or state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub province: Option<String>,
}

/// Pickup request on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickupRequestWire {
    /// Entity id.
    pub id: String,
    /// Customer the goods belong to.
    pub customer_name: String,
    /// Contact phone at the pickup site.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_phone: Option<String>,
    /// Where to collect.
    pub pickup_address: PickupAddress,
    /// Requested pickup time, ISO-8601.
    pub scheduled_at: String,
    /// Workflow status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Declared total weight in grams.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_weight_grams: Option<u64>,
    /// Free-form notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Branch handling the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<String>,
}

/// Pickup request as stored on the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickupRequest {
    /// Entity id.
    pub id: String,
    /// Customer the goods belong to.
    pub customer_name: String,
    /// Contact phone, empty if unknown.
    pub contact_phone: String,
    /// Street and number.
    pub address_street: String,
    /// City.
    pub address_city: String,
    /// Postal code.
    pub address_postal_code: Option<String>,
    /// Province or state.
    pub address_province: Option<String>,
    /// Requested pickup time, epoch millis.
    pub scheduled_at: i64,
    /// Workflow status.
    pub status: String,
    /// Declared total weight in kilograms.
    pub total_weight_kg: f64,
    /// Free-form notes, empty if none.
    pub notes: String,
    /// Branch handling the request.
    pub branch_id: Option<String>,
}

/// Maps [`PickupRequestWire`] to and from [`PickupRequest`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PickupRequestMapper;

impl EntityMapper for PickupRequestMapper {
    type Wire = PickupRequestWire;
    type Local = PickupRequest;
    const ENTITY_TYPE: EntityType = EntityType::PickupRequest;

    fn to_local(wire: PickupRequestWire) -> Result<PickupRequest, MapError> {
        require_id(&wire.id)?;
        if wire.customer_name.trim().is_empty() {
            return Err(MapError::invalid("customerName", "must not be empty"));
        }
        Ok(PickupRequest {
            scheduled_at: parse_iso_millis("scheduledAt", &wire.scheduled_at)?,
            id: wire.id,
            customer_name: wire.customer_name,
            contact_phone: wire.contact_phone.unwrap_or_default(),
            address_street: wire.pickup_address.street,
            address_city: wire.pickup_address.city,
            address_postal_code: wire.pickup_address.postal_code,
            address_province: wire.pickup_address.province,
            status: wire
                .status
                .unwrap_or_else(|| DEFAULT_PICKUP_STATUS.to_string()),
            total_weight_kg: grams_to_kg(wire.total_weight_grams.unwrap_or(0)),
            notes: wire.notes.unwrap_or_default(),
            branch_id: wire.branch_id,
        })
    }

    fn to_wire(local: &PickupRequest) -> PickupRequestWire {
        PickupRequestWire {
            id: local.id.clone(),
            customer_name: local.customer_name.clone(),
            contact_phone: non_empty(&local.contact_phone),
            pickup_address: PickupAddress {
                street: local.address_street.clone(),
                city: local.address_city.clone(),
                postal_code: local.address_postal_code.clone(),
                province: local.address_province.clone(),
            },
            scheduled_at: format_iso_millis(local.scheduled_at),
            status: Some(local.status.clone()),
            total_weight_grams: Some(kg_to_grams(local.total_weight_kg)),
            notes: non_empty(&local.notes),
            branch_id: local.branch_id.clone(),
        }
    }

    fn local_id(local: &PickupRequest) -> &str {
        &local.id
    }

    fn into_payload(wire: PickupRequestWire) -> WirePayload {
        WirePayload::PickupRequest(wire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wire() -> PickupRequestWire {
        serde_json::from_value(json!({
            "id": "pr-100",
            "customerName": "PT Sinar Jaya",
            "pickupAddress": { "street": "Jl. Merdeka 12", "city": "Bandung", "postalCode": "40111" },
            "scheduledAt": "2024-05-02T08:30:00Z",
            "totalWeightGrams": 12500
        }))
        .unwrap()
    }

    #[test]
    fn flattens_address_and_converts_units() {
        let local = PickupRequestMapper::to_local(wire()).unwrap();
        assert_eq!(local.address_street, "Jl. Merdeka 12");
        assert_eq!(local.address_city, "Bandung");
        assert_eq!(local.address_postal_code.as_deref(), Some("40111"));
        assert_eq!(local.address_province, None);
        assert_eq!(local.scheduled_at, 1_714_638_600_000);
        assert_eq!(local.total_weight_kg, 12.5);
    }

    #[test]
    fn fills_defaults() {
        let local = PickupRequestMapper::to_local(wire()).unwrap();
        assert_eq!(local.status, DEFAULT_PICKUP_STATUS);
        assert_eq!(local.contact_phone, "");
        assert_eq!(local.notes, "");
    }

    #[test]
    fn to_wire_nests_address_and_drops_empty_strings() {
        let local = PickupRequestMapper::to_local(wire()).unwrap();
        let body = serde_json::to_value(PickupRequestMapper::to_wire(&local)).unwrap();
        assert_eq!(body["pickupAddress"]["city"], "Bandung");
        assert_eq!(body["scheduledAt"], "2024-05-02T08:30:00.000Z");
        assert_eq!(body["totalWeightGrams"], 12500);
        assert!(body.get("contactPhone").is_none());
        assert!(body.get("notes").is_none());
    }

    #[test]
    fn rejects_bad_input() {
        let mut bad_time = wire();
        bad_time.scheduled_at = "02/05/2024".into();
        assert!(matches!(
            PickupRequestMapper::to_local(bad_time),
            Err(MapError::InvalidTimestamp { field: "scheduledAt", .. })
        ));

        let mut no_customer = wire();
        no_customer.customer_name = " ".into();
        assert!(PickupRequestMapper::to_local(no_customer).is_err());
    }
}
