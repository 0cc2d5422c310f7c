//! Response envelopes.

use crate::entity::EntityType;
use crate::error::{ProtocolError, ProtocolResult};
use crate::time::parse_iso_millis;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The `{ success, data?, error? }` body every endpoint returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEnvelope {
    /// Whether the server accepted the request.
    pub success: bool,
    /// Response payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Failure details when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

/// Server-reported failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// Machine-readable code, e.g. `VALIDATION_ERROR`.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl ApiEnvelope {
    /// A successful envelope carrying `data`.
    pub fn ok(data: Option<Value>) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    /// A failed envelope.
    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }

    /// Parses an envelope from a response body.
    ///
    /// An empty body (as some servers send for `204 No Content`) is read
    /// as a bare success.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not an envelope.
    pub fn from_body(body: &[u8]) -> ProtocolResult<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::ok(None));
        }
        Ok(serde_json::from_slice(body)?)
    }

    /// Describes the failure for `lastError` and logs.
    pub fn failure_message(&self) -> String {
        match &self.error {
            Some(err) => format!("{}: {}", err.code, err.message),
            None => "server reported success=false".to_string(),
        }
    }
}

/// The decoded `data` of a pull response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PullData {
    /// Changed entities per type, in [`EntityType::ALL`] order.
    pub entities: Vec<(EntityType, Vec<Value>)>,
    /// Server clock at the time of the query, in epoch millis.
    pub server_time: Option<i64>,
    /// Keys this client does not recognize.
    pub unknown_keys: Vec<String>,
}

impl PullData {
    /// Key carrying the server clock.
    pub const SERVER_TIME_KEY: &'static str = "serverTime";

    /// Splits a pull `data` object into per-type entity lists.
    ///
    /// `serverTime` may be epoch millis or an ISO-8601 string. A missing
    /// or null `data` is an empty change set.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` is not an object, an entity key does not
    /// hold an array, or `serverTime` is unreadable.
    pub fn from_data(data: Option<Value>) -> ProtocolResult<Self> {
        let mut map = match data {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(ProtocolError::malformed(format!(
                    "pull data must be an object, got {other}"
                )))
            }
        };

        let server_time = match map.remove(Self::SERVER_TIME_KEY) {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) => Some(n.as_i64().ok_or_else(|| {
                ProtocolError::malformed(format!("serverTime out of range: {n}"))
            })?),
            Some(Value::String(s)) => Some(parse_iso_millis("serverTime", &s)?),
            Some(other) => {
                return Err(ProtocolError::malformed(format!(
                    "serverTime must be a number or string, got {other}"
                )))
            }
        };

        let mut entities = Vec::new();
        for entity_type in EntityType::ALL {
            match map.remove(entity_type.tag()) {
                None | Some(Value::Null) => {}
                Some(Value::Array(items)) => entities.push((entity_type, items)),
                Some(_) => {
                    return Err(ProtocolError::malformed(format!(
                        "`{entity_type}` must be an array"
                    )))
                }
            }
        }

        Ok(Self {
            entities,
            server_time,
            unknown_keys: map.into_iter().map(|(k, _)| k).collect(),
        })
    }

    /// Total number of entities across all types.
    pub fn len(&self) -> usize {
        self.entities.iter().map(|(_, items)| items.len()).sum()
    }

    /// Returns true if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
