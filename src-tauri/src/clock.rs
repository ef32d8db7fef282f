use chrono::{DateTime, Local, NaiveDateTime, Timelike, Utc};

use crate::error::{ConsoleError, Result};

/// Text form of a local date-time at minute precision (`datetime-local` inputs).
pub const LOCAL_MINUTE_FORMAT: &str = "%Y-%m-%dT%H:%M";

const ACCEPTED_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
];

pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;

    /// Wall-clock time the windows are compared against.
    fn now_local(&self) -> NaiveDateTime;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn now_local(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Clock pinned to one instant; local time equals UTC.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    pub fn at_local(local: NaiveDateTime) -> Self {
        Self(local.and_utc())
    }
}

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.0
    }

    fn now_local(&self) -> NaiveDateTime {
        self.0.naive_utc()
    }
}

pub fn truncate_to_minute(value: NaiveDateTime) -> NaiveDateTime {
    value
        .with_second(0)
        .and_then(|v| v.with_nanosecond(0))
        .unwrap_or(value)
}

/// Parses a form date-time; seconds, when present, are dropped.
pub fn parse_local_minute(value: &str) -> Result<NaiveDateTime> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConsoleError::validation("Date and time are required."));
    }
    for format in ACCEPTED_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(truncate_to_minute(parsed));
        }
    }
    Err(ConsoleError::validation(format!(
        "Invalid date and time: {trimmed}"
    )))
}

pub fn format_local_minute(value: &NaiveDateTime) -> String {
    value.format(LOCAL_MINUTE_FORMAT).to_string()
}

pub fn unix_ms(value: &DateTime<Utc>) -> u64 {
    value.timestamp_millis().max(0) as u64
}

/// Serde adapter for `NaiveDateTime` stored as `YYYY-MM-DDTHH:MM`.
pub mod local_minute {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_local_minute(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_local_minute(&raw).map_err(serde::de::Error::custom)
    }
}
