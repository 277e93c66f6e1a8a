// models/src/errors.rs

use std::time::Duration;

use bcrypt::BcryptError;
pub use thiserror::Error;

use crate::validator::ValidationErrors;

/// Errors shared by every layer below the HTTP boundary.
///
/// Storage-engine failures never leak out as their raw type: known constraint
/// violations become `DuplicateEmail`, `RecordNotFound` or `EditConflict`, and
/// everything else lands in one of the internal variants.
#[derive(Debug, Error)]
pub enum ClinicError {
    #[error("record not found")]
    RecordNotFound,

    #[error("edit conflict")]
    EditConflict,

    #[error("duplicate email")]
    DuplicateEmail,

    #[error("validation failed: {0:?}")]
    ValidationFailed(ValidationErrors),

    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    #[error("Database operation failed: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Password hashing error: {0}")]
    PasswordHashingError(#[from] BcryptError),

    #[error("Token generation error: {0}")]
    TokenGenerationError(String),

    #[error("An internal error occurred: {0}")]
    InternalError(String),
}

#[cfg(feature = "sled-errors")]
impl From<sled::Error> for ClinicError {
    fn from(err: sled::Error) -> Self {
        ClinicError::DatabaseError(err.to_string())
    }
}

#[cfg(feature = "bincode-errors")]
impl From<bincode::error::EncodeError> for ClinicError {
    fn from(err: bincode::error::EncodeError) -> Self {
        ClinicError::SerializationError(err.to_string())
    }
}

#[cfg(feature = "bincode-errors")]
impl From<bincode::error::DecodeError> for ClinicError {
    fn from(err: bincode::error::DecodeError) -> Self {
        ClinicError::DeserializationError(err.to_string())
    }
}

impl From<serde_json::Error> for ClinicError {
    fn from(err: serde_json::Error) -> Self {
        ClinicError::SerializationError(format!("JSON processing error: {}", err))
    }
}

/// A type alias for a `Result` that returns a `ClinicError` on failure.
pub type ClinicResult<T> = Result<T, ClinicError>;
