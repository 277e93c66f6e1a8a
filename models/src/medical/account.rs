// models/src/medical/account.rs
// Doctors and receptionists share one account shape and one email space;
// only the profile differs.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::medical::role::Role;
use crate::medical::shift::{format_shift_time, shift_time};
use crate::password::Password;
use crate::validator::{digit_count, matches, Validator, EMAIL_RX};

pub const MAX_NAME_BYTES: usize = 500;
pub const MIN_PASSWORD_BYTES: usize = 8;
pub const MAX_PASSWORD_BYTES: usize = 72;
pub const MIN_SPECIALIZATION_CHARS: usize = 4;
pub const MIN_CONTACT_DIGITS: u32 = 10;

/// Role-specific part of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Profile {
    Doctor { specialization: String, contact: i64 },
    Receptionist,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    pub password: Password,
    pub version: i64,
    #[serde(with = "shift_time")]
    pub shift_start: NaiveTime,
    #[serde(with = "shift_time")]
    pub shift_end: NaiveTime,
    pub profile: Profile,
}

impl Account {
    /// An account that has not been persisted yet. The store assigns `id`,
    /// `created_at` and `version` on insert.
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        shift_start: NaiveTime,
        shift_end: NaiveTime,
        profile: Profile,
    ) -> Self {
        Account {
            id: 0,
            created_at: Utc::now(),
            name: name.into(),
            email: email.into(),
            password: Password::default(),
            version: 0,
            shift_start,
            shift_end,
            profile,
        }
    }

    pub fn role(&self) -> Role {
        match self.profile {
            Profile::Doctor { .. } => Role::Doctor,
            Profile::Receptionist => Role::Receptionist,
        }
    }

    pub fn view(&self) -> AccountView {
        let (specialization, contact) = match &self.profile {
            Profile::Doctor { specialization, contact } => (Some(specialization.clone()), Some(*contact)),
            Profile::Receptionist => (None, None),
        };
        AccountView {
            id: self.id,
            created_at: self.created_at,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role(),
            specialization,
            contact,
            shift_start: format_shift_time(&self.shift_start),
            shift_end: format_shift_time(&self.shift_end),
        }
    }
}

/// What callers get to see of an account: no password material, no version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountView {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub specialization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub contact: Option<i64>,
    pub shift_start: String,
    pub shift_end: String,
}

pub fn validate_email(v: &mut Validator, email: &str) {
    v.check(!email.is_empty(), "email", "must be provided");
    v.check(matches(email, &EMAIL_RX), "email", "must be a valid email address");
}

pub fn validate_plaintext_password(v: &mut Validator, plaintext: &str) {
    v.check(!plaintext.is_empty(), "password", "must be provided");
    v.check(plaintext.len() >= MIN_PASSWORD_BYTES, "password", "must be at least 8 bytes long");
    v.check(plaintext.len() <= MAX_PASSWORD_BYTES, "password", "must be at most 72 bytes long");
}

pub fn validate_shift(v: &mut Validator, start: NaiveTime, end: NaiveTime) {
    v.check(end > start, "shift", "shift timing should be valid");
}

/// Checks every field of `account` and records all violations in `v`.
///
/// # Panics
///
/// Panics when the password hash has not been set. That is a caller bug, not
/// bad user input: hashing always happens before validation.
pub fn validate_account(v: &mut Validator, account: &Account) {
    v.check(!account.name.is_empty(), "name", "must be provided");
    v.check(
        account.name.len() <= MAX_NAME_BYTES,
        "name",
        "name must be at most 500 bytes long",
    );

    validate_email(v, &account.email);
    validate_shift(v, account.shift_start, account.shift_end);

    if let Some(plaintext) = account.password.plaintext() {
        validate_plaintext_password(v, plaintext);
    }

    if let Profile::Doctor { specialization, contact } = &account.profile {
        v.check(
            specialization.chars().count() >= MIN_SPECIALIZATION_CHARS,
            "specialization",
            "doctor must have some specialization",
        );
        v.check(
            *contact > 0 && digit_count(*contact) >= MIN_CONTACT_DIGITS,
            "contact",
            "contact number should be at least 10 digits long",
        );
    }

    if !account.password.is_set() {
        panic!("missing password hash for account {:?}", account.email);
    }
}
