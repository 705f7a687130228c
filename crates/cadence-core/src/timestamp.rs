//! Text codecs for the two timestamp shapes the platform hands back.

use chrono::{DateTime, FixedOffset, Utc};

use crate::error::{CadenceError, Result};

/// Date, 24h time and numeric offset; the zone abbreviation is handled separately.
const LEDGER_BODY_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// Parse a ledger timestamp such as `2024-01-01 12:06:00 +0000 UTC`.
///
/// The trailing abbreviation must be 3-5 ASCII letters or a signed numeric name (`+03`);
/// the numeric offset carries the actual zone information.
pub fn parse_ledger_timestamp(subject: &str, value: &str) -> Result<DateTime<FixedOffset>> {
    let err = |reason: &str| CadenceError::Parse {
        subject: subject.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    };
    let trimmed = value.trim();
    let (body, zone) = trimmed
        .rsplit_once(' ')
        .ok_or_else(|| err("expected `YYYY-MM-DD hh:mm:ss +hhmm ZZZ`"))?;
    if !is_zone_abbreviation(zone) {
        return Err(err("missing or invalid timezone abbreviation"));
    }
    DateTime::parse_from_str(body, LEDGER_BODY_FORMAT).map_err(|e| err(&e.to_string()))
}

pub fn format_ledger_timestamp(at: DateTime<Utc>) -> String {
    format!("{} UTC", at.format(LEDGER_BODY_FORMAT))
}

fn is_zone_abbreviation(s: &str) -> bool {
    let alpha = (3..=5).contains(&s.len()) && s.chars().all(|c| c.is_ascii_alphabetic());
    let numeric = s.len() >= 2
        && (s.starts_with('+') || s.starts_with('-'))
        && s[1..].chars().all(|c| c.is_ascii_digit())
        && s.len() <= 5;
    alpha || numeric
}

/// Parse a schedule creation timestamp. The platform wraps it in single quotes.
pub fn parse_creation_timestamp(subject: &str, raw: &str) -> Result<DateTime<Utc>> {
    let cleaned = raw.replace('\'', "");
    DateTime::parse_from_rfc3339(cleaned.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| CadenceError::Parse {
            subject: subject.to_string(),
            value: raw.to_string(),
            reason: e.to_string(),
        })
}
