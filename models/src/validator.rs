// models/src/validator.rs

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

/// Field name → first message recorded for that field.
pub type ValidationErrors = BTreeMap<String, String>;

pub static EMAIL_RX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .expect("email pattern is a valid regex")
});

/// Collects every field-level violation instead of stopping at the first one,
/// so a single response can report all of them.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Validator {
    errors: ValidationErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Records `message` for `key` unless that field already has one.
    pub fn add_error(&mut self, key: &str, message: &str) {
        self.errors
            .entry(key.to_string())
            .or_insert_with(|| message.to_string());
    }

    pub fn check(&mut self, ok: bool, key: &str, message: &str) {
        if !ok {
            self.add_error(key, message);
        }
    }

    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    pub fn into_errors(self) -> ValidationErrors {
        self.errors
    }
}

pub fn matches(value: &str, rx: &Regex) -> bool {
    rx.is_match(value)
}

/// Number of decimal digits in `n`, ignoring sign. Zero has one digit.
pub fn digit_count(n: i64) -> u32 {
    n.unsigned_abs().checked_ilog10().map_or(1, |d| d + 1)
}
