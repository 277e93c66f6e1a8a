// models/src/lib.rs
//! Clinic domain model: staff accounts, patients, tokens, field validation,
//! and the shared error type.

pub mod errors;
pub mod medical;
pub mod password;
pub mod token;
pub mod validator;

pub use errors::{ClinicError, ClinicResult};
pub use medical::{Account, AccountView, Gender, Patient, Profile, Role};
pub use password::Password;
pub use token::{Principal, TokenRecord, TokenScope};
pub use validator::{ValidationErrors, Validator};
