use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification used in reports. Every kind is fatal to the run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    Config,
    Command,
    Assertion,
    Timeout,
}

#[derive(Debug, Error)]
pub enum CadenceError {
    #[error("invalid period {0}m: must be between 1 and 60 and divide 60 evenly")]
    InvalidPeriod(u32),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{operation} failed: {message}")]
    Command { operation: String, message: String },

    #[error("assertion failed ({check}): expected {expected}, observed {observed}")]
    Assertion {
        check: String,
        expected: String,
        observed: String,
    },

    #[error("malformed timestamp {value:?} for {subject}: {reason}")]
    Parse {
        subject: String,
        value: String,
        reason: String,
    },

    #[error("deadline {deadline} exceeded during {during}")]
    DeadlineExceeded { during: String, deadline: DateTime<Utc> },

    #[error("command {command} did not finish within {after_secs}s")]
    CommandTimedOut { command: String, after_secs: u64 },

    #[error("period boundary not observed after {checks} checks; schedule was not activated")]
    AlignmentMissed { checks: u32 },
}

impl CadenceError {
    pub fn assertion(check: impl Into<String>, expected: impl ToString, observed: impl ToString) -> Self {
        CadenceError::Assertion {
            check: check.into(),
            expected: expected.to_string(),
            observed: observed.to_string(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            CadenceError::InvalidPeriod(_) | CadenceError::InvalidConfig(_) => FailureKind::Config,
            CadenceError::Command { .. } => FailureKind::Command,
            CadenceError::Assertion { .. } | CadenceError::Parse { .. } | CadenceError::AlignmentMissed { .. } => {
                FailureKind::Assertion
            }
            CadenceError::DeadlineExceeded { .. } | CadenceError::CommandTimedOut { .. } => FailureKind::Timeout,
        }
    }
}

pub type Result<T> = std::result::Result<T, CadenceError>;
