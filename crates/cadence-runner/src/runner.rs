use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rand::{rngs::StdRng, SeedableRng};
use tracing::{error, info, warn};

use cadence_artifacts::{ArtifactStore, FsArtifactStore, RunManifest};
use cadence_core::{
    parse_ledger_lines, CadenceError, Clock, Ledger, Observation, Phase, PhaseRecord, PhaseStatus, RestoreName,
    RestoreOutcome, RunId, RunReport, Schedule, ScheduleName, SelectedSnapshot, SystemClock, Verdict,
};
use cadence_platform::Platform;
use cadence_velero::VeleroPlatform;

use crate::{
    aligner::Aligner,
    context::{Evidence, RunContext},
    deadline::Deadline,
    resources::{create_managed_resources, teardown_namespaces, verify_restored},
    restore::restore_snapshot,
    select::select_snapshot,
    window::WindowVerifier,
    Config,
};

/// Time allowed for the best-effort schedule deletion after a run.
const CLEANUP_BUDGET: Duration = Duration::from_secs(60);

/// Drives one verification run through every phase, stopping at the first failure.
pub struct Runner {
    pub cfg: Config,
    pub platform: Arc<dyn Platform>,
    pub clock: Arc<dyn Clock>,
    pub artifacts: Option<FsArtifactStore>,
    pub run_id: RunId,
    pub schedule_name: ScheduleName,
    pub restore_name: RestoreName,
    rng: StdRng,
}

/// What earlier phases hand to later ones.
#[derive(Default)]
struct RunState {
    schedule: Option<Schedule>,
    observations: Vec<Observation>,
    ledger: Ledger,
    selected: Option<SelectedSnapshot>,
    restore: Option<RestoreOutcome>,
}

impl Runner {
    /// Production wiring: velero/kubectl on the host and the system clock.
    pub fn open(cfg: Config) -> Result<Self> {
        cfg.validate()?;
        let platform = Arc::new(VeleroPlatform::new(cfg.velero_settings()));
        Ok(Self::with_parts(cfg, platform, Arc::new(SystemClock)))
    }

    pub fn with_parts(cfg: Config, platform: Arc<dyn Platform>, clock: Arc<dyn Clock>) -> Self {
        let rng = match cfg.run.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let artifacts = cfg.report_dir().map(FsArtifactStore::new);
        Self {
            cfg,
            platform,
            clock,
            artifacts,
            run_id: RunId::new(),
            schedule_name: ScheduleName::new(),
            restore_name: RestoreName::new(),
            rng,
        }
    }

    /// Write a default config to `path`. Returns false when one already exists and `force` is off.
    pub fn init_config(path: &Path, force: bool) -> Result<bool> {
        if path.exists() && !force {
            return Ok(false);
        }
        Config::default_config().save_to(path)?;
        Ok(true)
    }

    /// Read the current ledger of any schedule without starting a run.
    pub fn read_ledger(&self, schedule: &ScheduleName) -> Result<Ledger> {
        let lines = self
            .platform
            .list_ledger(&self.cfg.run.ledger_scope, schedule, self.cfg.command_timeout())
            .with_context(|| format!("list ledger for {schedule}"))?;
        Ok(parse_ledger_lines(&lines)?)
    }

    /// Run every phase. Never errors: failures are reported in the verdict.
    pub fn run(&mut self) -> RunReport {
        let started_at = self.clock.now();
        let deadline = Deadline::start(self.clock.clone(), self.cfg.deadline());
        let evidence = self.open_evidence();
        info!(run_id = %self.run_id, schedule = %self.schedule_name, platform = self.platform.name(), "run started");

        let mut records = Vec::new();
        let mut state = RunState::default();
        let mut failure: Option<(Phase, CadenceError)> = None;

        let init_started = self.clock.now();
        let ctx = match self.init(deadline, evidence.clone()) {
            Ok(ctx) => {
                records.push(self.record(Phase::Init, PhaseStatus::Pass, None, init_started));
                Some(ctx)
            }
            Err(e) => {
                records.push(self.record(Phase::Init, PhaseStatus::Fail, Some(e.to_string()), init_started));
                failure = Some((Phase::Init, e));
                None
            }
        };

        for phase in Phase::ALL.into_iter().skip(1) {
            let ctx = match (&ctx, &failure) {
                (Some(ctx), None) => ctx,
                _ => {
                    records.push(PhaseRecord {
                        phase,
                        status: PhaseStatus::Skipped,
                        detail: None,
                        started_at: None,
                        finished_at: None,
                    });
                    continue;
                }
            };
            let phase_started = self.clock.now();
            info!(%phase, "phase started");
            match self.execute(phase, ctx, &mut state) {
                Ok(detail) => {
                    info!(%phase, "phase passed");
                    records.push(self.record(phase, PhaseStatus::Pass, detail, phase_started));
                }
                Err(e) => {
                    error!(%phase, kind = ?e.kind(), "phase failed: {e}");
                    records.push(self.record(phase, PhaseStatus::Fail, Some(e.to_string()), phase_started));
                    failure = Some((phase, e));
                }
            }
        }

        if let Some(schedule) = &state.schedule {
            if self.cfg.cleanup.delete_schedule {
                if let Err(e) = self.platform.delete_schedule(&schedule.name, CLEANUP_BUDGET) {
                    warn!(schedule = %schedule.name, "schedule cleanup failed: {e:#}");
                }
            }
        }

        let verdict = match failure {
            None => Verdict::Pass,
            Some((phase, e)) => Verdict::Fail { phase, kind: e.kind(), message: e.to_string() },
        };
        let report = RunReport {
            run_id: self.run_id.clone(),
            schedule_name: self.schedule_name.clone(),
            restore_name: self.restore_name.clone(),
            period_minutes: self.cfg.run.period_minutes,
            verify_times: self.cfg.run.verify_times,
            started_at,
            finished_at: self.clock.now(),
            schedule: state.schedule,
            phases: records,
            observations: state.observations,
            selected: state.selected,
            restore: state.restore,
            verdict,
        };
        match &report.verdict {
            Verdict::Pass => info!(run_id = %report.run_id, "run passed"),
            Verdict::Fail { phase, message, .. } => warn!(run_id = %report.run_id, %phase, "run failed: {message}"),
        }
        if let Some(ev) = &evidence {
            if let Err(e) = self.write_report(ev, &report) {
                warn!("write run report: {e:#}");
            }
        }
        report
    }

    fn init(&self, deadline: Deadline, evidence: Option<Evidence>) -> Result<RunContext, CadenceError> {
        let run = self
            .cfg
            .test_run(self.run_id.clone(), self.schedule_name.clone(), self.restore_name.clone())?;
        let ctx = RunContext {
            run,
            cfg: self.cfg.clone(),
            platform: self.platform.clone(),
            clock: self.clock.clone(),
            deadline,
            evidence,
        };
        Ok(ctx)
    }

    fn execute(&mut self, phase: Phase, ctx: &RunContext, state: &mut RunState) -> Result<Option<String>, CadenceError> {
        match phase {
            Phase::Init => Ok(None),
            Phase::Activate => {
                create_managed_resources(ctx)?;
                match Aligner::new(ctx).align_and_activate()? {
                    Some(schedule) => {
                        let detail = format!("activated at {}", schedule.activated_at);
                        state.schedule = Some(schedule);
                        Ok(Some(detail))
                    }
                    None => Ok(Some("no boundary observed; schedule not activated".to_string())),
                }
            }
            Phase::PreWindowCheck => {
                WindowVerifier::new(ctx).pre_window(&mut state.observations)?;
                Ok(None)
            }
            Phase::CadenceLoop => {
                state.ledger = WindowVerifier::new(ctx).cadence_loop(&mut state.observations)?;
                Ok(Some(format!("final ledger length {}", state.ledger.len())))
            }
            Phase::SelectAndCleanup => {
                let selected = select_snapshot(&state.ledger, &mut self.rng)?;
                let detail = format!("selected {}", selected.id);
                state.selected = Some(selected);
                teardown_namespaces(ctx)?;
                Ok(Some(detail))
            }
            Phase::Restore => {
                let selected = state
                    .selected
                    .as_ref()
                    .ok_or_else(|| CadenceError::assertion("restore input", "a selected snapshot", "none"))?;
                state.restore = Some(restore_snapshot(ctx, selected)?);
                Ok(None)
            }
            Phase::Verify => {
                verify_restored(ctx, self.cfg.verify.mode)?;
                Ok(None)
            }
        }
    }

    fn record(&self, phase: Phase, status: PhaseStatus, detail: Option<String>, started_at: DateTime<Utc>) -> PhaseRecord {
        PhaseRecord { phase, status, detail, started_at: Some(started_at), finished_at: Some(self.clock.now()) }
    }

    fn open_evidence(&self) -> Option<Evidence> {
        let store = self.artifacts.clone()?;
        match store.create_run_dir(&self.run_id) {
            Ok(run_dir) => Some(Evidence { store, run_dir }),
            Err(e) => {
                warn!("evidence disabled: {e:#}");
                None
            }
        }
    }

    fn write_report(&self, ev: &Evidence, report: &RunReport) -> Result<()> {
        ev.store.append_worklog(&ev.run_dir, &format!("## Run {} ({})", report.run_id, self.platform.name()))?;
        for r in &report.phases {
            let line = match &r.detail {
                Some(d) => format!("- {}: {:?} ({d})", r.phase, r.status),
                None => format!("- {}: {:?}", r.phase, r.status),
            };
            ev.store.append_worklog(&ev.run_dir, &line)?;
        }
        ev.store.write_manifest(&ev.run_dir, &RunManifest::new(self.platform.name(), report.clone()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::{FailureKind, VirtualClock};
    use cadence_platform::{Faults, SimulatedPlatform};
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn runner(start: (u32, u32), faults: Faults) -> (Runner, Arc<SimulatedPlatform>, VirtualClock) {
        let clock = VirtualClock::starting_at(Utc.with_ymd_and_hms(2024, 1, 1, 12, start.0, start.1).unwrap());
        let platform = Arc::new(SimulatedPlatform::with_faults(Arc::new(clock.clone()), faults));
        let mut cfg = Config::default_config();
        cfg.run.seed = Some(42);
        let r = Runner::with_parts(cfg, platform.clone(), Arc::new(clock.clone()));
        (r, platform, clock)
    }

    #[test]
    fn happy_path_passes_every_phase() {
        let (mut r, platform, _) = runner((1, 10), Faults::default());
        let report = r.run();
        assert!(report.passed(), "{:?}", report.verdict);
        assert!(report.phases.iter().all(|p| p.status == PhaseStatus::Pass));
        assert_eq!(report.cadence_lengths(), vec![2, 3, 4, 5, 6]);
        let schedule = report.schedule.as_ref().unwrap();
        assert_eq!(schedule.activated_at, Utc.with_ymd_and_hms(2024, 1, 1, 12, 3, 10).unwrap());
        assert!(report.selected.as_ref().unwrap().index < 6);
        assert!(!platform.has_schedule(&report.schedule_name));
    }

    #[test]
    fn failure_skips_later_phases() {
        let faults = Faults { skip_ticks: vec![2], ..Faults::default() };
        let (mut r, platform, _) = runner((1, 10), faults);
        let report = r.run();
        assert_eq!(report.failed_phase(), Some(Phase::CadenceLoop));
        assert_eq!(report.cadence_lengths(), vec![2, 2]);
        for p in [Phase::SelectAndCleanup, Phase::Restore, Phase::Verify] {
            assert_eq!(report.phase_status(p), Some(PhaseStatus::Skipped));
        }
        assert_eq!(platform.call_count("create_restore"), 0);
        assert_eq!(platform.call_count("delete_schedule"), 1);
    }

    #[test]
    fn invalid_config_fails_init_without_touching_platform() {
        let (mut r, platform, _) = runner((1, 10), Faults::default());
        r.cfg.run.period_minutes = 7;
        let report = r.run();
        match &report.verdict {
            Verdict::Fail { phase, kind, .. } => {
                assert_eq!(*phase, Phase::Init);
                assert_eq!(*kind, FailureKind::Config);
            }
            Verdict::Pass => panic!("expected failure"),
        }
        assert!(platform.calls().is_empty());
    }

    #[test]
    fn namespace_creation_failure_belongs_to_activate() {
        let faults = Faults { fail_operations: vec!["create_namespace".into()], ..Faults::default() };
        let (mut r, platform, _) = runner((1, 10), faults);
        let report = r.run();
        assert_eq!(report.phase_status(Phase::Init), Some(PhaseStatus::Pass));
        assert_eq!(report.failed_phase(), Some(Phase::Activate));
        assert!(matches!(report.verdict, Verdict::Fail { kind: FailureKind::Command, .. }));
        assert_eq!(platform.call_count("create_schedule"), 0);
    }

    #[test]
    fn schedule_creation_error_is_a_command_failure() {
        let faults = Faults { fail_operations: vec!["create_schedule".into()], ..Faults::default() };
        let (mut r, platform, _) = runner((1, 10), faults);
        let report = r.run();
        assert_eq!(report.failed_phase(), Some(Phase::Activate));
        assert!(matches!(report.verdict, Verdict::Fail { kind: FailureKind::Command, .. }));
        assert_eq!(platform.call_count("delete_schedule"), 0);
    }

    #[test]
    fn writes_manifest_and_worklog_when_report_dir_set() {
        let dir = tempdir().unwrap();
        let (mut r, _, _) = runner((1, 10), Faults::default());
        r.artifacts = Some(FsArtifactStore::new(dir.path().to_path_buf()));
        let report = r.run();
        let run_dir = dir.path().join(report.run_id.as_str());
        let worklog = std::fs::read_to_string(run_dir.join("worklog.md")).unwrap();
        assert!(worklog.contains("- verify: Pass"));
        assert!(run_dir.join("run_manifest.json").exists());
        assert!(run_dir.join("ledger/cadence-4.txt").exists());
        assert!(run_dir.join("restore/outcome.json").exists());
    }

    #[test]
    fn seeded_runs_pick_the_same_snapshot_index() {
        let (mut a, _, _) = runner((1, 10), Faults::default());
        let (mut b, _, _) = runner((1, 10), Faults::default());
        assert_eq!(a.run().selected.unwrap().index, b.run().selected.unwrap().index);
    }

    #[test]
    fn read_ledger_reads_any_schedule() {
        let (r, _, _) = runner((0, 5), Faults::default());
        assert!(r.read_ledger(&ScheduleName::from_str("nothing")).unwrap().is_empty());
    }
}
