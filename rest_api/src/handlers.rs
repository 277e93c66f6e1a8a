// rest_api/src/handlers.rs

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::info;

use clinic_models::medical::validate_patient;
use clinic_models::{Gender, Patient, Principal, Role, Validator};

const GENDER_MESSAGE: &str = "gender can only be male, female or others";
use clinic_security::{ProfileUpdate, Registration};

use crate::error::ApiError;
use crate::AppState;

/// `{"<key>": value}`
fn envelope(key: &str, value: impl Serialize) -> Result<Json<Value>, ApiError> {
    let mut body = Map::new();
    body.insert(key.to_string(), serde_json::to_value(value)?);
    Ok(Json(Value::Object(body)))
}

/// Path ids that do not parse or are below 1 name nothing.
fn read_id(raw: &str) -> Result<i64, ApiError> {
    match raw.parse::<i64>() {
        Ok(id) if id >= 1 => Ok(id),
        _ => Err(ApiError::NotFound),
    }
}

pub async fn healthcheck(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "available",
        "system_info": {
            "environment": state.environment.as_str(),
            "version": env!("CARGO_PKG_VERSION"),
        }
    }))
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound
}

pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<Registration>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let role = headers
        .get("Role")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<Role>().ok())
        .ok_or_else(|| ApiError::BadRequest("the Role header must be \"doctor\" or \"receptionist\"".to_string()))?;
    let Json(input) = payload?;

    let (account, token) = state.accounts.register(role, input).await?;

    let mut body = Map::new();
    body.insert(role.to_string(), serde_json::to_value(account.view())?);
    body.insert("token".to_string(), serde_json::to_value(&token)?);
    Ok((StatusCode::CREATED, Json(Value::Object(body))))
}

#[derive(Debug, Deserialize)]
pub struct LoginInput {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginInput>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(input) = payload?;
    let token = state.accounts.authenticate(&input.email, &input.password).await?;
    Ok((StatusCode::CREATED, envelope("authentication_token", &token)?))
}

pub async fn show_account(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Value>, ApiError> {
    let account = state.accounts.profile(&principal).await?;
    envelope("account", account.view())
}

pub async fn update_account(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<ProfileUpdate>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(update) = payload?;
    let account = state.accounts.update_profile(&principal, update).await?;
    envelope("account", account.view())
}

/// Patient fields as sent by clients. Creation needs all of them; an update
/// only overwrites the ones present.
#[derive(Debug, Default, Deserialize)]
pub struct PatientInput {
    pub name: Option<String>,
    /// Parsed in `apply` so an unknown value is a field error, not a bad body.
    pub gender: Option<String>,
    pub age: Option<i32>,
    pub contact: Option<i64>,
    pub address: Option<String>,
    pub medical_history: Option<String>,
    pub insurance_info: Option<String>,
    pub last_visit: Option<DateTime<Utc>>,
    pub doctor_id: Option<i64>,
    /// The version the client last read. Required on update.
    pub version: Option<i64>,
}

impl PatientInput {
    fn apply(self, p: &mut Patient, errors: &mut Validator) {
        if let Some(v) = self.name {
            p.name = v;
        }
        if let Some(raw) = self.gender {
            match raw.parse::<Gender>() {
                Ok(gender) => p.gender = gender,
                Err(_) => errors.add_error("gender", GENDER_MESSAGE),
            }
        }
        if let Some(v) = self.age {
            p.age = v;
        }
        if let Some(v) = self.contact {
            p.contact = v;
        }
        if let Some(v) = self.address {
            p.address = v;
        }
        if let Some(v) = self.medical_history {
            p.medical_history = v;
        }
        if let Some(v) = self.insurance_info {
            p.insurance_info = v;
        }
        if let Some(v) = self.last_visit {
            p.last_visit = v;
        }
        if let Some(v) = self.doctor_id {
            p.doctor_id = v;
        }
    }
}

fn check_patient(v: &mut Validator, patient: &Patient) -> Result<(), ApiError> {
    validate_patient(v, patient, Utc::now());
    if v.valid() {
        Ok(())
    } else {
        Err(ApiError::ValidationFailed(v.errors().clone()))
    }
}

pub async fn create_patient(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<PatientInput>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(input) = payload?;

    let mut v = Validator::new();
    v.check(input.gender.is_some(), "gender", "must be provided");
    v.check(input.last_visit.is_some(), "last visit", "must be provided");

    let now = Utc::now();
    let mut patient = Patient {
        id: 0,
        created_at: now,
        name: String::new(),
        gender: Gender::Other,
        age: 0,
        contact: 0,
        address: String::new(),
        medical_history: String::new(),
        insurance_info: String::new(),
        last_visit: now,
        version: 0,
        doctor_id: 0,
    };
    input.apply(&mut patient, &mut v);
    check_patient(&mut v, &patient)?;

    state.patients.insert(&mut patient).await?;
    info!("patient {} created by {}", patient.id, principal.email);

    let location = format!("/v1/patients/{}", patient.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        envelope("patient", &patient)?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct PatientFilter {
    pub doctor_id: Option<i64>,
}

pub async fn list_patients(
    State(state): State<AppState>,
    filter: Result<Query<PatientFilter>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(filter) = filter?;
    let patients = state.patients.list(filter.doctor_id).await?;
    envelope("patients", &patients)
}

pub async fn show_patient(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = read_id(&raw_id)?;
    let patient = state.patients.get_by_id(id).await?;
    envelope("patient", &patient)
}

pub async fn update_patient(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(raw_id): Path<String>,
    payload: Result<Json<PatientInput>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let id = read_id(&raw_id)?;
    let mut patient = state.patients.get_by_id(id).await?;
    let Json(input) = payload?;

    let mut v = Validator::new();
    match input.version {
        Some(expected) if expected != patient.version => return Err(ApiError::EditConflict),
        Some(_) => {}
        None => v.add_error("version", "must be provided"),
    }

    input.apply(&mut patient, &mut v);
    check_patient(&mut v, &patient)?;

    state.patients.update(&mut patient).await?;
    info!("patient {} updated to version {} by {}", patient.id, patient.version, principal.email);
    envelope("patient", &patient)
}

pub async fn delete_patient(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(raw_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = read_id(&raw_id)?;
    state.patients.delete(id).await?;
    info!("patient {} deleted by {}", id, principal.email);
    envelope("message", "patient info deleted successfully")
}
