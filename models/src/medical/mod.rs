// models/src/medical/mod.rs
pub mod account;
pub mod patient;
pub mod role;
pub mod shift;

pub use account::{validate_account, Account, AccountView, Profile};
pub use patient::{validate_patient, Gender, Patient};
pub use role::Role;
pub use shift::{format_shift_time, parse_shift_time};
