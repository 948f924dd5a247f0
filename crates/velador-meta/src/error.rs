//! Error types for velador-meta.

use std::time::Duration;

/// Result type alias for metadata operations.
pub type Result<T> = std::result::Result<T, MetadataError>;

/// Error type for metadata-store operations.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    /// I/O error reading or writing a metadata record.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted record could not be parsed.
    #[error("malformed {record} record: {reason}")]
    Parse {
        /// The record that failed to parse (e.g. `pid`, `fingerprint`).
        record: String,
        /// Why parsing failed.
        reason: String,
    },

    /// A record did not appear within the allowed bound.
    #[error("{record} record did not appear within {waited:?}")]
    Timeout {
        /// The record that was awaited.
        record: String,
        /// How long we waited.
        waited: Duration,
    },

    /// The advisory process lock could not be acquired.
    #[error("process lock error: {0}")]
    Lock(String),

    /// A signal could not be delivered to a recorded process.
    #[error("process error: {0}")]
    Process(String),
}

impl MetadataError {
    /// Creates a parse error for the given record.
    #[must_use]
    pub fn parse(record: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            record: record.into(),
            reason: reason.into(),
        }
    }

    /// Creates a process error.
    #[must_use]
    pub fn process(msg: impl Into<String>) -> Self {
        Self::Process(msg.into())
    }
}
