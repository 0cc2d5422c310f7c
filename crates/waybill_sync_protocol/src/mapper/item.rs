use super::{grams_to_kg, kg_to_grams, require_id, EntityMapper};
use crate::entity::EntityType;
use crate::error::MapError;
use crate::payload::WirePayload;
use serde::{Deserialize, Serialize};

/// Parcel dimensions in centimetres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dimensions {
    /// Length.
    pub length_cm: f64,
    /// Width.
    pub width_cm: f64,
    /// Height.
    pub height_cm: f64,
}

/// Item on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemWire {
    /// Entity id.
    pub id: String,
    /// Owning pickup request.
    pub pickup_request_id: String,
    /// What the parcel contains.
    pub description: String,
    /// Number of identical parcels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
    /// Weight in grams.
    pub weight_grams: u64,
    /// Parcel dimensions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
    /// Courier barcode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barcode: Option<String>,
}

/// Item as stored on the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Entity id.
    pub id: String,
    /// Owning pickup request.
    pub pickup_request_id: String,
    /// What the parcel contains.
    pub description: String,
    /// Number of identical parcels, at least 1.
    pub quantity: u32,
    /// Weight in kilograms.
    pub weight_kg: f64,
    /// Length in centimetres.
    pub length_cm: Option<f64>,
    /// Width in centimetres.
    pub width_cm: Option<f64>,
    /// Height in centimetres.
    pub height_cm: Option<f64>,
    /// Courier barcode.
    pub barcode: Option<String>,
}

/// Maps [`ItemWire`] to and from [`Item`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ItemMapper;

impl EntityMapper for ItemMapper {
    type Wire = ItemWire;
    type Local = Item;
    const ENTITY_TYPE: EntityType = EntityType::Item;

    fn to_local(wire: ItemWire) -> Result<Item, MapError> {
        require_id(&wire.id)?;
        let quantity = wire.quantity.unwrap_or(1);
        if quantity == 0 {
            return Err(MapError::invalid("quantity", "must be at least 1"));
        }
        let (length_cm, width_cm, height_cm) = match wire.dimensions {
            Some(d) => (Some(d.length_cm), Some(d.width_cm), Some(d.height_cm)),
            None => (None, None, None),
        };
        Ok(Item {
            id: wire.id,
            pickup_request_id: wire.pickup_request_id,
            description: wire.description,
            quantity,
            weight_kg: grams_to_kg(wire.weight_grams),
            length_cm,
            width_cm,
            height_cm,
            barcode: wire.barcode,
        })
    }

    fn to_wire(local: &Item) -> ItemWire {
        // The server takes all three dimensions or none.
        let dimensions = match (local.length_cm, local.width_cm, local.height_cm) {
            (Some(length_cm), Some(width_cm), Some(height_cm)) => Some(Dimensions {
                length_cm,
                width_cm,
                height_cm,
            }),
            _ => None,
        };
        ItemWire {
            id: local.id.clone(),
            pickup_request_id: local.pickup_request_id.clone(),
            description: local.description.clone(),
            quantity: Some(local.quantity),
            weight_grams: kg_to_grams(local.weight_kg),
            dimensions,
            barcode: local.barcode.clone(),
        }
    }

    fn local_id(local: &Item) -> &str {
        &local.id
    }

    fn into_payload(wire: ItemWire) -> WirePayload {
        WirePayload::Item(wire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wire(extra: serde_json::Value) -> ItemWire {
        let mut base = json!({
            "id": "it-1",
            "pickupRequestId": "pr-1",
            "description": "Ceramic tiles",
            "weightGrams": 2300
        });
        if let (Some(base), Some(extra)) = (base.as_object_mut(), extra.as_object()) {
            base.extend(extra.clone());
        }
        serde_json::from_value(base).unwrap()
    }

    #[test]
    fn defaults_and_units() {
        let local = ItemMapper::to_local(wire(json!({}))).unwrap();
        assert_eq!(local.quantity, 1);
        assert_eq!(local.weight_kg, 2.3);
        assert_eq!(local.length_cm, None);
    }

    #[test]
    fn dimensions_flatten_and_renest() {
        let local = ItemMapper::to_local(wire(json!({
            "dimensions": { "lengthCm": 40.0, "widthCm": 30.0, "heightCm": 20.5 }
        })))
        .unwrap();
        assert_eq!(local.height_cm, Some(20.5));

        let back = ItemMapper::to_wire(&local);
        assert_eq!(back.dimensions.map(|d| d.width_cm), Some(30.0));
        assert_eq!(back.weight_grams, 2300);
    }

    #[test]
    fn partial_dimensions_are_not_sent() {
        let mut local = ItemMapper::to_local(wire(json!({}))).unwrap();
        local.length_cm = Some(10.0);
        assert!(ItemMapper::to_wire(&local).dimensions.is_none());
    }

    #[test]
    fn zero_quantity_is_rejected() {
        assert!(ItemMapper::to_local(wire(json!({ "quantity": 0 }))).is_err());
    }
}
