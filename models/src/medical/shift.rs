// models/src/medical/shift.rs
//! Wall-clock shift times, read and rendered as `"3:04 PM"`.

use chrono::NaiveTime;

pub const SHIFT_TIME_FORMAT: &str = "%-I:%M %p";

pub fn parse_shift_time(s: &str) -> Result<NaiveTime, chrono::ParseError> {
    NaiveTime::parse_from_str(s.trim(), SHIFT_TIME_FORMAT)
}

pub fn format_shift_time(t: &NaiveTime) -> String {
    t.format(SHIFT_TIME_FORMAT).to_string()
}

/// `#[serde(with = "shift_time")]` adapter for `NaiveTime` fields.
pub mod shift_time {
    use chrono::NaiveTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_shift_time(t))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_shift_time(&s).map_err(de::Error::custom)
    }
}
