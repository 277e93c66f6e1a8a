// security/src/errors.rs

use clinic_models::{ClinicError, ValidationErrors};
use thiserror::Error;

/// Failures of the token gate and the account flows.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Missing, malformed, unknown or expired bearer token.
    #[error("invalid or missing authentication token")]
    InvalidAuthenticationToken,

    #[error("validation failed: {0:?}")]
    ValidationFailed(ValidationErrors),

    /// The token is fine but its role is not accepted by the endpoint.
    #[error("your user account doesn't have the necessary permissions to access this resource")]
    InvalidCredentials,

    /// Unknown email or wrong password at login.
    #[error("invalid authentication credentials")]
    LoginFailed,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Store(#[from] ClinicError),
}

pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    pub fn validation(key: &str, message: &str) -> Self {
        let mut errors = ValidationErrors::new();
        errors.insert(key.to_string(), message.to_string());
        AuthError::ValidationFailed(errors)
    }
}
