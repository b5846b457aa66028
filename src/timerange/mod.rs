//! Timestamp parsing and clip range validation.
//!
//! Timestamps are colon-delimited whole seconds: `SS`, `MM:SS` or `HH:MM:SS`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest accepted timestamp, 99:59:59
pub const MAX_TIMESTAMP_SECONDS: u64 = 100 * 3600 - 1;

/// How malformed timestamps are treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampPolicy {
    /// Unparseable input counts as 0 seconds
    #[default]
    Lenient,
    /// Unparseable input rejects the request
    Strict,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TimestampError {
    #[error("Timestamp is empty")]
    Empty,

    #[error("Invalid {field} value '{value}' in timestamp")]
    InvalidComponent { field: &'static str, value: String },

    #[error("Invalid timestamp format: {0}")]
    InvalidFormat(String),

    #[error("Timestamp {0} is beyond 99:59:59")]
    OutOfRange(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("End time must be after start time.")]
    EndNotAfterStart { start_seconds: u64, end_seconds: u64 },

    #[error("Invalid time range: {0}")]
    InvalidTimestamp(#[from] TimestampError),
}

/// Validated clip window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Offset into the source in seconds
    pub start_seconds: u64,

    /// Length of the clip in seconds, always > 0
    pub duration_seconds: u64,
}

impl TimeRange {
    pub fn end_seconds(&self) -> u64 {
        self.start_seconds.saturating_add(self.duration_seconds)
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} ({}s)",
            format_hms(self.start_seconds),
            format_hms(self.end_seconds()),
            self.duration_seconds
        )
    }
}

/// Parse a timestamp, treating anything malformed as 0 seconds.
pub fn parse(raw: &str) -> u64 {
    parse_strict(raw).unwrap_or(0)
}

/// Parse a timestamp, rejecting malformed input.
pub fn parse_strict(raw: &str) -> Result<u64, TimestampError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(TimestampError::Empty);
    }

    let parts: Vec<&str> = raw.split(':').collect();
    let fields: &[(&'static str, u64)] = match parts.len() {
        1 => &[("seconds", 1)],
        2 => &[("minutes", 60), ("seconds", 1)],
        3 => &[("hours", 3600), ("minutes", 60), ("seconds", 1)],
        _ => return Err(TimestampError::InvalidFormat(raw.to_string())),
    };

    let total = parts
        .iter()
        .zip(fields)
        .try_fold(0u64, |total, (part, &(field, scale))| {
            let value = parse_component(part).ok_or_else(|| TimestampError::InvalidComponent {
                field,
                value: part.to_string(),
            })?;
            value
                .checked_mul(scale)
                .and_then(|v| total.checked_add(v))
                .ok_or_else(|| TimestampError::OutOfRange(raw.to_string()))
        })?;

    if total > MAX_TIMESTAMP_SECONDS {
        return Err(TimestampError::OutOfRange(raw.to_string()));
    }
    Ok(total)
}

/// Digits only; rejects signs, decimals and inner whitespace.
fn parse_component(part: &str) -> Option<u64> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

/// Parse both timestamps under `policy` and compute the clip range.
pub fn parse_range(start: &str, end: &str, policy: TimestampPolicy) -> Result<TimeRange, RangeError> {
    let (start_seconds, end_seconds) = match policy {
        TimestampPolicy::Lenient => (parse(start), parse(end)),
        TimestampPolicy::Strict => (parse_strict(start)?, parse_strict(end)?),
    };
    compute_range(start_seconds, end_seconds)
}

/// Subtract start from end; a non-positive result is rejected.
pub fn compute_range(start_seconds: u64, end_seconds: u64) -> Result<TimeRange, RangeError> {
    if end_seconds <= start_seconds {
        return Err(RangeError::EndNotAfterStart {
            start_seconds,
            end_seconds,
        });
    }

    Ok(TimeRange {
        start_seconds,
        duration_seconds: end_seconds - start_seconds,
    })
}

fn format_hms(total: u64) -> String {
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}
