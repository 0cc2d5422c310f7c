use super::{require_id, EntityMapper};
use crate::entity::EntityType;
use crate::error::MapError;
use crate::payload::WirePayload;
use crate::time::{format_iso_millis, parse_iso_millis};
use serde::{Deserialize, Serialize};

/// GPS fix as the server nests it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coords {
    /// Degrees north.
    pub latitude: f64,
    /// Degrees east.
    pub longitude: f64,
    /// Horizontal accuracy in metres.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

/// Location ping on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationPingWire {
    /// Entity id.
    pub id: String,
    /// Reporting driver.
    pub driver_id: String,
    /// Position.
    pub coords: Coords,
    /// ISO-8601.
    pub recorded_at: String,
    /// Ground speed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_kmh: Option<f64>,
}

/// Location ping as stored on the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationPing {
    /// Entity id.
    pub id: String,
    /// Reporting driver.
    pub driver_id: String,
    /// Degrees north.
    pub latitude: f64,
    /// Degrees east.
    pub longitude: f64,
    /// Horizontal accuracy in metres; 0 when unknown.
    pub accuracy_m: f64,
    /// Epoch millis.
    pub recorded_at: i64,
    /// Ground speed.
    pub speed_kmh: Option<f64>,
}

/// Maps [`LocationPingWire`] to and from [`LocationPing`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LocationPingMapper;

impl EntityMapper for LocationPingMapper {
    type Wire = LocationPingWire;
    type Local = LocationPing;
    const ENTITY_TYPE: EntityType = EntityType::LocationPing;

    fn to_local(wire: LocationPingWire) -> Result<LocationPing, MapError> {
        require_id(&wire.id)?;
        let Coords {
            latitude,
            longitude,
            accuracy,
        } = wire.coords;
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(MapError::invalid("coords", "out of range"));
        }
        Ok(LocationPing {
            recorded_at: parse_iso_millis("recordedAt", &wire.recorded_at)?,
            id: wire.id,
            driver_id: wire.driver_id,
            latitude,
            longitude,
            accuracy_m: accuracy.unwrap_or(0.0),
            speed_kmh: wire.speed_kmh,
        })
    }

    fn to_wire(local: &LocationPing) -> LocationPingWire {
        LocationPingWire {
            id: local.id.clone(),
            driver_id: local.driver_id.clone(),
            coords: Coords {
                latitude: local.latitude,
                longitude: local.longitude,
                accuracy: (local.accuracy_m > 0.0).then_some(local.accuracy_m),
            },
            recorded_at: format_iso_millis(local.recorded_at),
            speed_kmh: local.speed_kmh,
        }
    }

    fn local_id(local: &LocationPing) -> &str {
        &local.id
    }

    fn into_payload(wire: LocationPingWire) -> WirePayload {
        WirePayload::LocationPing(wire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coords_flatten_with_default_accuracy() {
        let wire: LocationPingWire = serde_json::from_value(json!({
            "id": "lp-1",
            "driverId": "drv-7",
            "coords": { "latitude": -6.2, "longitude": 106.8 },
            "recordedAt": "1970-01-01T00:01:00Z"
        }))
        .unwrap();
        let local = LocationPingMapper::to_local(wire).unwrap();
        assert_eq!(local.latitude, -6.2);
        assert_eq!(local.accuracy_m, 0.0);
        assert_eq!(local.recorded_at, 60_000);

        let body = serde_json::to_value(LocationPingMapper::to_wire(&local)).unwrap();
        assert_eq!(body["coords"]["longitude"], 106.8);
        assert!(body["coords"].get("accuracy").is_none());
    }
}
