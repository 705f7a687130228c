use cadence_artifacts::EvidenceKind;
use cadence_core::{parse_ledger_lines, CadenceError, Ledger};

use crate::context::RunContext;

/// Reads the ledger for the run's schedule, keeping the raw listing as evidence.
pub struct LedgerPoller<'a> {
    ctx: &'a RunContext,
}

impl<'a> LedgerPoller<'a> {
    pub fn new(ctx: &'a RunContext) -> Self {
        Self { ctx }
    }

    /// `label` names the evidence file, e.g. `cadence-3`.
    pub fn poll(&self, label: &str) -> Result<Ledger, CadenceError> {
        let run = &self.ctx.run;
        let lines = self
            .ctx
            .call("backup get", |p, budget| p.list_ledger(&run.ledger_scope, &run.schedule_name, budget))?;
        self.ctx.record_evidence(EvidenceKind::Ledger, &format!("{label}.txt"), lines.join("\n").as_bytes());
        parse_ledger_lines(&lines)
    }
}
