//! Error types for velador-core.
//!
//! The supervisor's failure taxonomy is deliberately small: a service either
//! failed to start (`Startup`) or died while running (`Runtime`). Both are
//! fatal to the attempted launch or to the whole daemon process; there is no
//! degraded-partial-service mode.

use velador_meta::MetadataError;

/// Result type alias for supervisor operations.
pub type Result<T> = std::result::Result<T, SupervisorError>;

/// Error type for daemon supervision.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// A service failed to start, or a spawned instance never published a
    /// pid within the bound. Fatal to the attempted launch.
    #[error("startup failure: {0}")]
    Startup(String),

    /// A running service's task ended while the kill switch was unset.
    /// Fatal to the whole daemon process.
    #[error("runtime failure: {0}")]
    Runtime(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The auxiliary file-watch launcher failed.
    #[error("watcher error: {0}")]
    Watcher(String),

    /// Metadata-store operation failed.
    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SupervisorError {
    /// Creates a startup failure.
    #[must_use]
    pub fn startup(msg: impl Into<String>) -> Self {
        Self::Startup(msg.into())
    }

    /// Creates a runtime failure.
    #[must_use]
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a watcher error.
    #[must_use]
    pub fn watcher(msg: impl Into<String>) -> Self {
        Self::Watcher(msg.into())
    }

    /// Returns true for failures that abort an attempted launch.
    #[must_use]
    pub const fn is_startup(&self) -> bool {
        matches!(self, Self::Startup(_))
    }

    /// Returns true for failures that end a running daemon.
    #[must_use]
    pub const fn is_runtime(&self) -> bool {
        matches!(self, Self::Runtime(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SupervisorError::startup("service graph failed to start");
        assert_eq!(
            err.to_string(),
            "startup failure: service graph failed to start"
        );
    }

    #[test]
    fn test_taxonomy_predicates() {
        assert!(SupervisorError::startup("x").is_startup());
        assert!(!SupervisorError::startup("x").is_runtime());
        assert!(SupervisorError::runtime("x").is_runtime());
        assert!(!SupervisorError::config("x").is_startup());
    }

    #[test]
    fn test_metadata_error_converts() {
        let meta = MetadataError::parse("pid", "bad");
        let err: SupervisorError = meta.into();
        assert!(matches!(err, SupervisorError::Metadata(_)));
    }
}
