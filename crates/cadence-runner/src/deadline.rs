use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use cadence_core::{CadenceError, Clock};

/// Single overall deadline for a run. Waits never extend past it.
#[derive(Clone)]
pub struct Deadline {
    clock: Arc<dyn Clock>,
    expires_at: DateTime<Utc>,
}

impl Deadline {
    pub fn start(clock: Arc<dyn Clock>, budget: Duration) -> Self {
        let budget = chrono::Duration::from_std(budget).unwrap_or(chrono::Duration::MAX);
        let expires_at = clock.now().checked_add_signed(budget).unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self { clock, expires_at }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn remaining(&self) -> Duration {
        (self.expires_at - self.clock.now()).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn check(&self, during: &str) -> Result<(), CadenceError> {
        if self.clock.now() >= self.expires_at {
            return Err(self.exceeded(during));
        }
        Ok(())
    }

    /// Sleep for `d`, or until the deadline if that comes first (then fail).
    pub fn sleep(&self, d: Duration, during: &str) -> Result<(), CadenceError> {
        self.check(during)?;
        let remaining = self.remaining();
        if d > remaining {
            debug!(?remaining, during, "sleep truncated by deadline");
            self.clock.sleep(remaining);
            return Err(self.exceeded(during));
        }
        self.clock.sleep(d);
        Ok(())
    }

    fn exceeded(&self, during: &str) -> CadenceError {
        CadenceError::DeadlineExceeded { during: during.to_string(), deadline: self.expires_at }
    }
}
