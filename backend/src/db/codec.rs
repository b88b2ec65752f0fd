//! Column encodings shared by the sqlx repositories.

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub fn to_ms(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

pub fn from_ms(ms: i64) -> anyhow::Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms).ok_or_else(|| anyhow!("timestamp out of range: {ms}"))
}

/// `0` encodes "not set".
pub fn opt_from_ms(ms: i64) -> anyhow::Result<Option<DateTime<Utc>>> {
    if ms == 0 {
        return Ok(None);
    }
    from_ms(ms).map(Some)
}

pub fn opt_to_ms(t: Option<DateTime<Utc>>) -> i64 {
    t.map(to_ms).unwrap_or(0)
}

/// Empty string encodes "not set".
pub fn opt_text(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

pub fn parse_uuid(s: &str, column: &'static str) -> anyhow::Result<Uuid> {
    Uuid::parse_str(s).with_context(|| format!("invalid {column}: {s}"))
}

pub fn bool_to_i64(b: bool) -> i64 {
    i64::from(b)
}

pub fn i64_to_bool(v: i64) -> anyhow::Result<bool> {
    match v {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(anyhow!("out of range for bool: {other}")),
    }
}
