use tracing::info;

use cadence_artifacts::EvidenceKind;
use cadence_core::{CadenceError, RestoreOutcome, SelectedSnapshot};

use crate::context::RunContext;

/// Restore from the selected snapshot and wait for a terminal phase. Only `Completed` passes.
pub fn restore_snapshot(ctx: &RunContext, selected: &SelectedSnapshot) -> Result<RestoreOutcome, CadenceError> {
    let restore_name = ctx.run.restore_name.clone();
    let phase = ctx.call("restore create", |p, budget| p.create_restore(&restore_name, &selected.id, budget))?;
    let outcome = RestoreOutcome { restore_name, snapshot_id: selected.id.clone(), phase };
    if let Ok(json) = serde_json::to_vec_pretty(&outcome) {
        ctx.record_evidence(EvidenceKind::Restore, "outcome.json", &json);
    }
    if !outcome.is_success() {
        return Err(CadenceError::assertion(
            format!("restore {} from {}", outcome.restore_name, outcome.snapshot_id),
            "Completed",
            format!("{:?}", outcome.phase),
        ));
    }
    info!(restore = %outcome.restore_name, snapshot = %outcome.snapshot_id, "restore completed");
    Ok(outcome)
}
