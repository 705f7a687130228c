use std::cmp::Ordering;

use tracing::{debug, info};

use cadence_core::{
    expected_cadence_len, pre_window_polls_at, CadenceError, CheckpointKind, Ledger, Observation, WINDOW_POLL,
};

use crate::{context::RunContext, poller::LedgerPoller};

/// Ledger checks from activation through the last cadence iteration.
pub struct WindowVerifier<'a> {
    ctx: &'a RunContext,
    poller: LedgerPoller<'a>,
}

impl<'a> WindowVerifier<'a> {
    pub fn new(ctx: &'a RunContext) -> Self {
        Self { ctx, poller: LedgerPoller::new(ctx) }
    }

    /// One poll per minute for a period, skipping the last minute, which races the first
    /// snapshot. Every poll must see an empty ledger. Ends with the settle delay.
    pub fn pre_window(&self, observations: &mut Vec<Observation>) -> Result<(), CadenceError> {
        let period = self.ctx.run.period;
        for i in 0..period.minutes() {
            self.ctx.sleep(WINDOW_POLL, "pre-window")?;
            if !pre_window_polls_at(i, period) {
                debug!(minute = i, "last pre-window minute not polled");
                continue;
            }
            let ledger = self.poller.poll(&format!("pre-window-{i}"))?;
            observations.push(self.observe(CheckpointKind::PreWindow, i, 0, &ledger));
            if !ledger.is_empty() {
                return Err(CadenceError::assertion(
                    format!("pre-window minute {i}: snapshot before first boundary"),
                    0,
                    ledger.len(),
                ));
            }
        }
        self.ctx.sleep(self.ctx.cfg.settle_delay(), "settle")?;
        Ok(())
    }

    /// After each full-period sleep the ledger must hold exactly `i + 2` snapshots.
    pub fn cadence_loop(&self, observations: &mut Vec<Observation>) -> Result<Ledger, CadenceError> {
        let period = self.ctx.run.period;
        let mut ledger = Ledger::default();
        for i in 0..self.ctx.run.verify_times {
            self.ctx.sleep(period.as_duration(), "cadence")?;
            ledger = self.poller.poll(&format!("cadence-{i}"))?;
            let expected = expected_cadence_len(i);
            observations.push(self.observe(CheckpointKind::Cadence, i, expected, &ledger));
            let what = match ledger.len().cmp(&expected) {
                Ordering::Equal => {
                    info!(iteration = i, len = ledger.len(), "cadence check passed");
                    continue;
                }
                Ordering::Less => "missed tick",
                Ordering::Greater => "extra tick",
            };
            return Err(CadenceError::assertion(format!("cadence iteration {i}: {what}"), expected, ledger.len()));
        }
        Ok(ledger)
    }

    fn observe(&self, kind: CheckpointKind, index: u32, expected_len: usize, ledger: &Ledger) -> Observation {
        Observation { kind, index, at: self.ctx.clock.now(), expected_len, observed_len: ledger.len() }
    }
}
