use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CadenceError, Result};

/// Schedule period in whole minutes. Only values dividing 60 are representable, so a
/// `*/N` cron expression fires at the same minutes every hour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Period(u32);

impl Period {
    pub fn new(minutes: u32) -> Result<Self> {
        if minutes == 0 || minutes > 60 || 60 % minutes != 0 {
            return Err(CadenceError::InvalidPeriod(minutes));
        }
        Ok(Self(minutes))
    }

    pub fn minutes(self) -> u32 {
        self.0
    }

    pub fn as_duration(self) -> Duration {
        Duration::from_secs(u64::from(self.0) * 60)
    }

    pub fn cron_expr(self) -> String {
        format!("*/{} * * * *", self.0)
    }

    /// True when the minute-of-hour of `at` sits on a period boundary.
    pub fn is_boundary(self, at: DateTime<Utc>) -> bool {
        at.minute() % self.0 == 0
    }
}

impl TryFrom<u32> for Period {
    type Error = CadenceError;

    fn try_from(value: u32) -> Result<Self> {
        Period::new(value)
    }
}

impl From<Period> for u32 {
    fn from(p: Period) -> u32 {
        p.0
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}m", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn accepts_only_divisors_of_sixty() {
        for m in [1, 2, 3, 4, 5, 6, 10, 12, 15, 20, 30, 60] {
            assert!(Period::new(m).is_ok(), "{m}");
        }
        for m in [0, 7, 8, 9, 11, 25, 45, 61, 120] {
            assert!(matches!(Period::new(m), Err(CadenceError::InvalidPeriod(x)) if x == m));
        }
    }

    #[test]
    fn cron_expression_is_every_n_minutes() {
        assert_eq!(Period::new(3).unwrap().cron_expr(), "*/3 * * * *");
    }

    #[test]
    fn boundary_uses_minute_of_hour() {
        let p = Period::new(3).unwrap();
        assert!(p.is_boundary(Utc.with_ymd_and_hms(2024, 1, 1, 12, 9, 59).unwrap()));
        assert!(!p.is_boundary(Utc.with_ymd_and_hms(2024, 1, 1, 12, 10, 0).unwrap()));
        assert!(p.is_boundary(Utc.with_ymd_and_hms(2024, 1, 1, 13, 0, 0).unwrap()));
    }
}
