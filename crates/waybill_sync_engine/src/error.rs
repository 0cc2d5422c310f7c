//! Error types for the sync engine.

use thiserror::Error;
use waybill_sync_protocol::{MapError, ProtocolError};

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// How a failure should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Network trouble or a server fault; likely to succeed later.
    Transient,
    /// The server refused the request; retrying the same payload is
    /// unlikely to help.
    Rejected,
    /// The run cannot start at all. Not counted against any entry.
    Precondition,
    /// The device's own storage or data is at fault.
    Local,
}

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The request never produced a response.
    #[error("network error: {0}")]
    Network(String),

    /// The request timed out.
    #[error("request timed out")]
    Timeout,

    /// The server answered 5xx, 408 or 429.
    #[error("server error {status}: {message}")]
    Server {
        /// HTTP status.
        status: u16,
        /// Body or error message.
        message: String,
    },

    /// The server answered 4xx or `success: false`.
    #[error("rejected by server ({status}): {message}")]
    Rejected {
        /// HTTP status.
        status: u16,
        /// Server error message.
        message: String,
    },

    /// The server's response could not be interpreted.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// No auth token is available.
    #[error("no auth token available")]
    NoAuthToken,

    /// The device is offline.
    #[error("not connected to server")]
    NotConnected,

    /// Local store failure.
    #[error("store error: {0}")]
    Store(#[from] waybill_core::CoreError),

    /// Entity mapping failed.
    #[error("mapping error: {0}")]
    Mapping(#[from] MapError),

    /// JSON (de)serialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// An enqueue was malformed.
    #[error("invalid outbox entry: {0}")]
    InvalidEntry(String),

    /// A background task died.
    #[error("background task failed: {0}")]
    Background(String),
}

impl SyncError {
    /// Creates an invalid entry error.
    pub fn invalid_entry(message: impl Into<String>) -> Self {
        Self::InvalidEntry(message.into())
    }

    /// Classifies an HTTP error status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            408 | 429 | 500..=599 => Self::Server { status, message },
            _ => Self::Rejected { status, message },
        }
    }

    /// Returns how this failure should be handled.
    pub fn kind(&self) -> FailureKind {
        match self {
            SyncError::Network(_) | SyncError::Timeout | SyncError::Server { .. } => {
                FailureKind::Transient
            }
            // A garbled response is usually a proxy or a half-deployed server.
            SyncError::Protocol(_) => FailureKind::Transient,
            SyncError::Rejected { .. } => FailureKind::Rejected,
            SyncError::NoAuthToken | SyncError::NotConnected => FailureKind::Precondition,
            SyncError::Store(_)
            | SyncError::Mapping(_)
            | SyncError::Json(_)
            | SyncError::InvalidEntry(_)
            | SyncError::Background(_) => FailureKind::Local,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        self.kind() == FailureKind::Transient
    }
}
