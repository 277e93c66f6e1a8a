// rest_api/src/error.rs

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::error;

use clinic_models::{ClinicError, ValidationErrors};
use clinic_security::AuthError;

pub const SERVER_ERROR_MESSAGE: &str = "the server encountered a problem and could not process your request";

/// Every failure a handler or middleware can answer with. Each variant maps to
/// one status code and an `{"error": ...}` body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("the requested resource could not be found")]
    NotFound,

    #[error("the method is not supported for this resource")]
    MethodNotAllowed,

    #[error("unable to update the record due to an edit conflict, please try again")]
    EditConflict,

    #[error("validation failed")]
    ValidationFailed(ValidationErrors),

    #[error("invalid or missing authentication token")]
    InvalidAuthenticationToken,

    #[error("invalid authentication credentials")]
    InvalidCredentials,

    #[error("your user account doesn't have the necessary permissions to access this resource")]
    NotPermitted,

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::EditConflict => StatusCode::CONFLICT,
            ApiError::ValidationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::InvalidAuthenticationToken | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::NotPermitted => StatusCode::FORBIDDEN,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ClinicError> for ApiError {
    fn from(err: ClinicError) -> Self {
        match err {
            ClinicError::RecordNotFound => ApiError::NotFound,
            ClinicError::EditConflict => ApiError::EditConflict,
            ClinicError::DuplicateEmail => {
                let mut errors = ValidationErrors::new();
                errors.insert("email".to_string(), "a user with this email address exists".to_string());
                ApiError::ValidationFailed(errors)
            }
            ClinicError::ValidationFailed(errors) => ApiError::ValidationFailed(errors),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidAuthenticationToken => ApiError::InvalidAuthenticationToken,
            AuthError::ValidationFailed(errors) => ApiError::ValidationFailed(errors),
            AuthError::InvalidCredentials => ApiError::NotPermitted,
            AuthError::LoginFailed => ApiError::InvalidCredentials,
            AuthError::BadRequest(msg) => ApiError::BadRequest(msg),
            AuthError::Store(e) => e.into(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Internal(format!("JSON encoding failed: {}", err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body: Value = match &self {
            ApiError::ValidationFailed(errors) => json!({ "error": errors }),
            ApiError::Internal(detail) => {
                error!("{}", detail);
                json!({ "error": SERVER_ERROR_MESSAGE })
            }
            other => json!({ "error": other.to_string() }),
        };

        let mut response = (status, Json(body)).into_response();
        if matches!(self, ApiError::InvalidAuthenticationToken) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_map_domain_conditions_to_status() {
        assert_eq!(ApiError::from(ClinicError::RecordNotFound).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::from(ClinicError::EditConflict).status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::from(ClinicError::DuplicateEmail).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::from(ClinicError::Timeout(std::time::Duration::from_secs(3))).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn should_separate_authentication_from_permission() {
        assert_eq!(ApiError::from(AuthError::InvalidAuthenticationToken).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::from(AuthError::LoginFailed).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::from(AuthError::InvalidCredentials).status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn should_challenge_missing_token() {
        let response = ApiError::InvalidAuthenticationToken.into_response();
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
    }
}
