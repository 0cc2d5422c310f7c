//! Error types for the local store.

use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by the local store.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] waybill_storage::StorageError),

    /// I/O error outside the backend (directory and lock handling).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A journal frame could not be encoded or decoded.
    #[error("journal codec error: {0}")]
    Codec(String),

    /// A record body did not match the requested type.
    #[error("record {table}/{id} has an unexpected shape: {source}")]
    RecordShape {
        /// Table holding the record.
        table: String,
        /// Record id.
        id: String,
        /// The decoding failure.
        #[source]
        source: serde_json::Error,
    },

    /// A value could not be turned into a JSON record.
    #[error("cannot serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The journal holds data that is not a torn tail.
    #[error("journal corruption: {message}")]
    JournalCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// Another process holds the store directory.
    #[error("store locked: another process has exclusive access")]
    StoreLocked,

    /// Invalid argument.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },
}

impl CoreError {
    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec(message.into())
    }

    /// Creates a journal corruption error.
    pub fn journal_corruption(message: impl Into<String>) -> Self {
        Self::JournalCorruption {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}
