// rest_api/src/middleware.rs

use std::any::Any;

use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use clinic_models::Role;
use clinic_security::AuthorizationGate;

use crate::error::ApiError;

/// The role set one group of routes accepts, carried as middleware state.
#[derive(Clone)]
pub struct RoleGuard {
    gate: AuthorizationGate,
    accepted: &'static [Role],
}

impl RoleGuard {
    pub fn new(gate: AuthorizationGate, accepted: &'static [Role]) -> Self {
        RoleGuard { gate, accepted }
    }
}

/// Resolves the bearer token and, if the caller may proceed, hands the
/// principal to the handler through the request extensions.
pub async fn require_roles(
    State(guard): State<RoleGuard>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let principal = guard.gate.authorize(header.as_deref(), guard.accepted).await?;
    debug!("{} {} as {} ({})", req.method(), req.uri().path(), principal.email, principal.role);

    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

/// axum answers a method mismatch with an empty 405; give it the usual body
/// and keep its `Allow` header.
pub async fn method_not_allowed_envelope(response: Response) -> Response {
    if response.status() != StatusCode::METHOD_NOT_ALLOWED {
        return response;
    }
    let allow = response.headers().get(header::ALLOW).cloned();
    let mut enveloped = ApiError::MethodNotAllowed.into_response();
    if let Some(allow) = allow {
        enveloped.headers_mut().insert(header::ALLOW, allow);
    }
    enveloped
}

/// Panic handler for `CatchPanicLayer`: a 500 with the generic body, and the
/// connection is closed so no partial response is reused.
pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };

    let mut response = ApiError::Internal(format!("handler panicked: {}", detail)).into_response();
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}
