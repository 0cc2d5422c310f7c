use super::{require_id, EntityMapper};
use crate::entity::EntityType;
use crate::error::MapError;
use crate::payload::WirePayload;
use crate::time::{format_iso_millis, parse_iso_millis};
use serde::{Deserialize, Serialize};

/// A latitude/longitude pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Degrees north.
    pub lat: f64,
    /// Degrees east.
    pub lng: f64,
}

/// Photo on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoWire {
    /// Entity id.
    pub id: String,
    /// Pickup request the photo documents.
    pub pickup_request_id: String,
    /// Where the image is stored.
    pub url: String,
    /// Free-form caption.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    /// ISO-8601.
    pub taken_at: String,
    /// Where the photo was taken.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoPoint>,
}

/// Photo as stored on the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct Photo {
    pub id: String,
    pub pickup_request_id: String,
    pub url: String,
    pub caption: String,
    pub taken_at: i64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Maps [`PhotoWire`] to and from [`Photo`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PhotoMapper;

impl EntityMapper for PhotoMapper {
    type Wire = PhotoWire;
    type Local = Photo;
    const ENTITY_TYPE: EntityType = EntityType::Photo;

    fn to_local(wire: PhotoWire) -> Result<Photo, MapError> {
        require_id(&wire.id)?;
        if let Some(point) = &wire.location {
            if !(-90.0..=90.0).contains(&point.lat) || !(-180.0..=180.0).contains(&point.lng) {
                return Err(MapError::invalid("location", "coordinates out of range"));
            }
        }
        Ok(Photo {
            taken_at: parse_iso_millis("takenAt", &wire.taken_at)?,
            id: wire.id,
            pickup_request_id: wire.pickup_request_id,
            url: wire.url,
            caption: wire.caption.unwrap_or_default(),
            latitude: wire.location.as_ref().map(|p| p.lat),
            longitude: wire.location.as_ref().map(|p| p.lng),
        })
    }

    fn to_wire(local: &Photo) -> PhotoWire {
        PhotoWire {
            id: local.id.clone(),
            pickup_request_id: local.pickup_request_id.clone(),
            url: local.url.clone(),
            caption: super::non_empty(&local.caption),
            taken_at: format_iso_millis(local.taken_at),
            location: match (local.latitude, local.longitude) {
                (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
                _ => None,
            },
        }
    }

    fn local_id(local: &Photo) -> &str {
        &local.id
    }

    fn into_payload(wire: PhotoWire) -> WirePayload {
        WirePayload::Photo(wire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn location_is_flattened() {
        let wire: PhotoWire = serde_json::from_value(json!({
            "id": "ph-1",
            "pickupRequestId": "pr-1",
            "url": "https://cdn.example/ph-1.jpg",
            "takenAt": "2024-05-02T08:31:00Z",
            "location": { "lat": -6.9, "lng": 107.6 }
        }))
        .unwrap();
        let local = PhotoMapper::to_local(wire).unwrap();
        assert_eq!(local.latitude, Some(-6.9));
        assert_eq!(local.longitude, Some(107.6));
        assert_eq!(local.caption, "");
    }

    #[test]
    fn out_of_range_location_is_rejected() {
        let wire: PhotoWire = serde_json::from_value(json!({
            "id": "ph-1",
            "pickupRequestId": "pr-1",
            "url": "u",
            "takenAt": "2024-05-02T08:31:00Z",
            "location": { "lat": 91.0, "lng": 0.0 }
        }))
        .unwrap();
        assert!(PhotoMapper::to_local(wire).is_err());
    }
}
