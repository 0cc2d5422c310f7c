use super::{require_id, EntityMapper};
use crate::entity::EntityType;
use crate::error::MapError;
use crate::payload::WirePayload;
use crate::time::{format_iso_millis, parse_iso_millis};
use serde::{Deserialize, Serialize};

/// Assignment on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentWire {
    /// Entity id.
    pub id: String,
    /// Pickup request being served.
    pub pickup_request_id: String,
    /// Assigned driver.
    pub driver_id: String,
    /// Vehicle, if already chosen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_id: Option<String>,
    /// ISO-8601.
    pub assigned_at: String,
    /// ISO-8601, set once the driver accepts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<String>,
    /// Workflow status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Assignment as stored on the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    /// Entity id.
    pub id: String,
    /// Pickup request being served.
    pub pickup_request_id: String,
    /// Assigned driver.
    pub driver_id: String,
    /// Vehicle, if already chosen.
    pub vehicle_id: Option<String>,
    /// Epoch millis.
    pub assigned_at: i64,
    /// Epoch millis.
    pub accepted_at: Option<i64>,
    /// Workflow status, `assigned` when the server omits it.
    pub status: String,
}

/// Maps [`AssignmentWire`] to and from [`Assignment`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AssignmentMapper;

impl EntityMapper for AssignmentMapper {
    type Wire = AssignmentWire;
    type Local = Assignment;
    const ENTITY_TYPE: EntityType = EntityType::Assignment;

    fn to_local(wire: AssignmentWire) -> Result<Assignment, MapError> {
        require_id(&wire.id)?;
        let accepted_at = wire
            .accepted_at
            .as_deref()
            .map(|at| parse_iso_millis("acceptedAt", at))
            .transpose()?;
        Ok(Assignment {
            assigned_at: parse_iso_millis("assignedAt", &wire.assigned_at)?,
            accepted_at,
            id: wire.id,
            pickup_request_id: wire.pickup_request_id,
            driver_id: wire.driver_id,
            vehicle_id: wire.vehicle_id,
            status: wire.status.unwrap_or_else(|| "assigned".to_string()),
        })
    }

    fn to_wire(local: &Assignment) -> AssignmentWire {
        AssignmentWire {
            id: local.id.clone(),
            pickup_request_id: local.pickup_request_id.clone(),
            driver_id: local.driver_id.clone(),
            vehicle_id: local.vehicle_id.clone(),
            assigned_at: format_iso_millis(local.assigned_at),
            accepted_at: local.accepted_at.map(format_iso_millis),
            status: Some(local.status.clone()),
        }
    }

    fn local_id(local: &Assignment) -> &str {
        &local.id
    }

    fn into_payload(wire: AssignmentWire) -> WirePayload {
        WirePayload::Assignment(wire)
    }
}
