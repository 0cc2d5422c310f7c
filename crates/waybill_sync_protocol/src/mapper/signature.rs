use super::{require_id, EntityMapper};
use crate::entity::EntityType;
use crate::error::MapError;
use crate::payload::WirePayload;
use crate::time::{format_iso_millis, parse_iso_millis};
use serde::{Deserialize, Serialize};

/// Signature on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureWire {
    /// Entity id.
    pub id: String,
    /// Pickup request being signed for.
    pub pickup_request_id: String,
    /// Name the signer gave.
    pub signer_name: String,
    /// Base64-encoded PNG.
    pub image_data: String,
    /// ISO-8601.
    pub signed_at: String,
}

/// Signature as stored on the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct Signature {
    pub id: String,
    pub pickup_request_id: String,
    pub signer_name: String,
    pub image_data: String,
    pub signed_at: i64,
}

/// Maps [`SignatureWire`] to and from [`Signature`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureMapper;

impl EntityMapper for SignatureMapper {
    type Wire = SignatureWire;
    type Local = Signature;
    const ENTITY_TYPE: EntityType = EntityType::Signature;

    fn to_local(wire: SignatureWire) -> Result<Signature, MapError> {
        require_id(&wire.id)?;
        if wire.image_data.is_empty() {
            return Err(MapError::invalid("imageData", "must not be empty"));
        }
        Ok(Signature {
            signed_at: parse_iso_millis("signedAt", &wire.signed_at)?,
            id: wire.id,
            pickup_request_id: wire.pickup_request_id,
            signer_name: wire.signer_name.trim().to_string(),
            image_data: wire.image_data,
        })
    }

    fn to_wire(local: &Signature) -> SignatureWire {
        SignatureWire {
            id: local.id.clone(),
            pickup_request_id: local.pickup_request_id.clone(),
            signer_name: local.signer_name.clone(),
            image_data: local.image_data.clone(),
            signed_at: format_iso_millis(local.signed_at),
        }
    }

    fn local_id(local: &Signature) -> &str {
        &local.id
    }

    fn into_payload(wire: SignatureWire) -> WirePayload {
        WirePayload::Signature(wire)
    }
}
