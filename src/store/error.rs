//! Store error types

use thiserror::Error;

/// Store result type
pub type StoreResult<T> = Result<T, StoreError>;

/// Failures reported by every store implementation
#[derive(Debug, Error)]
pub enum StoreError {
    /// A record with this identity already exists
    #[error("{entity} already exists: {id}")]
    Conflict { entity: &'static str, id: String },

    /// No record matched
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Feedback pointed at an inference that does not exist
    #[error("feedback references unknown inference: {inference_id}")]
    ReferentialViolation { inference_id: String },

    /// Malformed input
    #[error("validation error: {0}")]
    Validation(String),

    /// Underlying storage failure
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored row could not be decoded
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn conflict(entity: &'static str, id: impl Into<String>) -> Self {
        Self::Conflict { entity, id: id.into() }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    pub fn referential(inference_id: impl Into<String>) -> Self {
        Self::ReferentialViolation { inference_id: inference_id.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Short machine-readable kind, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::Conflict { .. } => "conflict",
            StoreError::NotFound { .. } => "not_found",
            StoreError::ReferentialViolation { .. } => "referential_violation",
            StoreError::Validation(_) => "validation",
            StoreError::Unavailable(_) => "unavailable",
            StoreError::Corrupt(_) => "corrupt",
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::FromSqlConversionFailure(..) => Self::Corrupt(err.to_string()),
            other => Self::Unavailable(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Corrupt(err.to_string())
    }
}
