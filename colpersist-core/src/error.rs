//! Error types for colpersist-core.
//!
//! Everything here is fatal for the current flush step: nothing is retried and
//! nothing is silently degraded.

use thiserror::Error;

/// Error reported by an execution primitive. Kept as-is and exposed as the
/// `source` of [`PersistError::Execution`].
pub type BackendError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum PersistError {
    /// A statement was requested for a descriptor lacking a required accessor,
    /// or the mapping itself is malformed.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Strategy combination that is deliberately not implemented.
    #[error("Unsupported strategy: {0}")]
    UnsupportedStrategy(String),

    /// A column has no registered parameter slot, or a slot was left unbound.
    /// Always a compiler/executor mismatch.
    #[error("Parameter resolution failed: {0}")]
    ParameterResolution(String),

    #[error("Value conversion failed: {0}")]
    ValueConversion(String),

    #[error("Null key for collection '{0}'")]
    NullKey(String),

    #[error("Statement execution failed: {sql}")]
    Execution {
        sql: String,
        #[source]
        source: BackendError,
    },
}

/// Result type for collection persistence operations
pub type PersistResult<T> = Result<T, PersistError>;

impl PersistError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        PersistError::Configuration(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        PersistError::UnsupportedStrategy(msg.into())
    }

    pub fn parameter(msg: impl Into<String>) -> Self {
        PersistError::ParameterResolution(msg.into())
    }

    pub fn conversion(msg: impl Into<String>) -> Self {
        PersistError::ValueConversion(msg.into())
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, PersistError::UnsupportedStrategy(_))
    }
}

impl serde::Serialize for PersistError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}
