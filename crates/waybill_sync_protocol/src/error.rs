//! Protocol and mapping errors.

use crate::entity::EntityType;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// A failure translating an entity between wire and local shape.
#[derive(Debug, Error)]
pub enum MapError {
    /// The JSON did not match the entity's wire or local struct.
    #[error("cannot decode {entity_type}: {source}")]
    Decode {
        /// Entity type being decoded.
        entity_type: EntityType,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A timestamp field was not valid ISO-8601.
    #[error("field `{field}` is not an ISO-8601 timestamp: {value:?}")]
    InvalidTimestamp {
        /// Field name on the wire.
        field: &'static str,
        /// The rejected value.
        value: String,
    },

    /// A field held a value outside its domain.
    #[error("field `{field}` is invalid: {message}")]
    InvalidValue {
        /// Field name on the wire.
        field: &'static str,
        /// What was wrong with it.
        message: String,
    },

    /// A payload was captured for a different entity type.
    #[error("payload is for {found}, expected {expected}")]
    PayloadMismatch {
        /// Entity type of the outbox entry.
        expected: EntityType,
        /// Entity type of the payload.
        found: EntityType,
    },
}

impl MapError {
    /// Creates an invalid value error.
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            message: message.into(),
        }
    }
}

/// Errors raised while interpreting server responses.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// An entity type tag that this client does not know.
    #[error("unknown entity type: {0}")]
    UnknownEntityType(String),

    /// A response that does not follow the `{ success, data, error }` shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// JSON (de)serialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Entity mapping failed.
    #[error(transparent)]
    Map(#[from] MapError),
}

impl ProtocolError {
    /// Creates a malformed response error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse(message.into())
    }
}
