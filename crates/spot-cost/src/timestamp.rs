//! Fixed timestamp format shared with the EC2 spot price API
//!
//! Every window bound is carried as text in the form
//!
//! ```text
//! 2015-12-01T10:30:00.000Z
//! ```
//!
//! Sub-second precision is always truncated to `.000`.
//!
//! ## State transition reasons
//!
//! Stopped and terminated instances report when they stopped only through
//! their free-text state reason:
//!
//! ```text
//! User initiated (2015-12-01 10:30:00 GMT)
//! ```
//!
//! The zone token at the end is read but never applied. The result is always
//! treated as UTC, whatever the token says.

use crate::error::{Result, SpotCostError};
use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

/// Textual window format (`YYYY-MM-DDTHH:MM:SS.000Z`)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S.000Z";

/// Render a UTC instant in the fixed window format
pub fn format_timestamp(t: DateTime<Utc>) -> String {
    t.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse the fixed window format, interpreting it as UTC
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| SpotCostError::timestamp(format!("{s:?}: {e}")))
}

/// Stop time pulled out of a state transition reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasonTimestamp {
    /// `<date>T<time>.000Z`
    pub timestamp: String,

    /// Zone token as written in the reason (e.g. "GMT"), not applied
    pub zone: Option<String>,
}

impl ReasonTimestamp {
    /// Whether the zone token agrees with the UTC interpretation
    pub fn zone_is_utc(&self) -> bool {
        match self.zone.as_deref() {
            None => true,
            Some(zone) => matches!(zone.to_ascii_uppercase().as_str(), "GMT" | "UTC" | "Z"),
        }
    }
}

/// Extract the stop time from a reason like `"User initiated (2015-12-01 10:30:00 GMT)"`.
///
/// Reads the text between the first `(` and the next `)`, takes its first two
/// whitespace tokens as date and time, and joins them as `<date>T<time>.000Z`.
/// Returns `None` when there is no parenthesised part or fewer than two tokens.
pub fn parse_reason_timestamp(reason: &str) -> Option<ReasonTimestamp> {
    let (_, after_open) = reason.split_once('(')?;
    let inner = after_open.split(')').next().unwrap_or(after_open);

    let mut tokens = inner.split_whitespace();
    let date = tokens.next()?;
    let time = tokens.next()?;
    let zone = tokens.next().map(str::to_string);

    let parsed = ReasonTimestamp {
        timestamp: format!("{date}T{time}.000Z"),
        zone,
    };

    if !parsed.zone_is_utc() {
        warn!(
            zone = parsed.zone.as_deref().unwrap_or_default(),
            timestamp = %parsed.timestamp,
            "State reason timestamp is not UTC; treating it as UTC anyway"
        );
    }

    Some(parsed)
}

/// Whole seconds between two instants, expressed in hours
pub fn hours_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end.timestamp() - start.timestamp()) as f64 / 3600.0
}
