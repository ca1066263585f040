//! Error types for attribution operations

use thiserror::Error;

/// Observation store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// The key-value backend could not be reached or a transaction failed.
    #[error("Observation store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Observation codec error: {reason}")]
    Codec { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Validation errors for caller-supplied input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all attribution errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AttributionError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl AttributionError {
    /// True when the failure came from the backend rather than the caller.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, AttributionError::Storage(StorageError::Unavailable { .. }))
    }
}

/// Result type alias for attribution operations.
pub type AttributionResult<T> = Result<T, AttributionError>;

// =============================================================================
// TESTS
// =============================================================================
