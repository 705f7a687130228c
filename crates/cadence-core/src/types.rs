use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    cadence::CheckpointKind, error::FailureKind, ids::*, model::*, period::Period,
};

/// Top-level context for one verification run.
#[derive(Clone, Debug)]
pub struct TestRun {
    pub run_id: RunId,
    pub schedule_name: ScheduleName,
    pub restore_name: RestoreName,
    pub namespaces: Vec<String>,
    pub resource_name: String,
    pub ledger_scope: String,
    pub period: Period,
    pub verify_times: u32,
    pub deadline: Duration,
}

/// What the activation call asks the platform to create.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduleSpec {
    pub name: ScheduleName,
    pub namespaces: Vec<String>,
    pub cron: String,
}

impl ScheduleSpec {
    pub fn for_run(run: &TestRun) -> Self {
        Self {
            name: run.schedule_name.clone(),
            namespaces: run.namespaces.clone(),
            cron: run.period.cron_expr(),
        }
    }

    pub fn include_namespaces(&self) -> String {
        self.namespaces.join(",")
    }
}

/// An activated schedule as observed on the platform.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Schedule {
    pub name: ScheduleName,
    pub cron: String,
    pub activated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// The config-map-style object created in every target namespace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedResource {
    pub name: String,
    pub data: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SelectedSnapshot {
    pub id: SnapshotId,
    /// Position in the final ledger it was drawn from.
    pub index: usize,
    pub ledger_len: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RestoreOutcome {
    pub restore_name: RestoreName,
    pub snapshot_id: SnapshotId,
    pub phase: RestorePhase,
}

impl RestoreOutcome {
    pub fn is_success(&self) -> bool {
        self.phase == RestorePhase::Completed
    }
}

/// One ledger poll compared against the planned length.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Observation {
    pub kind: CheckpointKind,
    pub index: u32,
    pub at: DateTime<Utc>,
    pub expected_len: usize,
    pub observed_len: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: Phase,
    pub status: PhaseStatus,
    pub detail: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail { phase: Phase, kind: FailureKind, message: String },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub schedule_name: ScheduleName,
    pub restore_name: RestoreName,
    pub period_minutes: u32,
    pub verify_times: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub schedule: Option<Schedule>,
    pub phases: Vec<PhaseRecord>,
    pub observations: Vec<Observation>,
    pub selected: Option<SelectedSnapshot>,
    pub restore: Option<RestoreOutcome>,
    pub verdict: Verdict,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Pass
    }

    pub fn phase_status(&self, phase: Phase) -> Option<PhaseStatus> {
        self.phases.iter().find(|r| r.phase == phase).map(|r| r.status)
    }

    pub fn failed_phase(&self) -> Option<Phase> {
        match &self.verdict {
            Verdict::Fail { phase, .. } => Some(*phase),
            Verdict::Pass => None,
        }
    }

    /// Observed lengths of the cadence checkpoints, in order.
    pub fn cadence_lengths(&self) -> Vec<usize> {
        self.observations
            .iter()
            .filter(|o| o.kind == CheckpointKind::Cadence)
            .map(|o| o.observed_len)
            .collect()
    }
}
