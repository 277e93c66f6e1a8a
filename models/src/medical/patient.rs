// models/src/medical/patient.rs
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::validator::{digit_count, Validator};

pub const MIN_PATIENT_CONTACT_DIGITS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    #[serde(alias = "others")]
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "other" | "others" => Ok(Gender::Other),
            other => Err(format!("unknown gender: {}", other)),
        }
    }
}

/// A patient record. Owned by the patient registry; `doctor_id` only references
/// a doctor account (0 means unassigned).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub gender: Gender,
    pub age: i32,
    pub contact: i64,
    pub address: String,
    pub medical_history: String,
    pub insurance_info: String,
    pub last_visit: DateTime<Utc>,
    pub version: i64,
    pub doctor_id: i64,
}

/// Checks a patient record against the clinical field rules. `now` is the
/// reference instant for the last-visit check.
pub fn validate_patient(v: &mut Validator, p: &Patient, now: DateTime<Utc>) {
    v.check(!p.name.is_empty(), "name", "name must be provided");
    v.check(p.age >= 0, "age", "age cannot be negative");
    v.check(
        p.contact > 0 && digit_count(p.contact) >= MIN_PATIENT_CONTACT_DIGITS,
        "contact",
        "contact number should be of at least 10 digits",
    );

    v.check(!p.medical_history.is_empty(), "medical history", "medical history must be provided");
    v.check(!p.insurance_info.is_empty(), "insurance info", "insurance info must be provided");

    v.check(p.last_visit < now, "last visit", "last visit should be before now");

    v.check(p.doctor_id >= 0, "doctor id", "doctor's id must be provided");
}
