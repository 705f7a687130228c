use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use cadence_core::{MissedBoundary, RunReport, Verdict, VerifyMode, VirtualClock};
use cadence_platform::{Faults, SimulatedPlatform};

use crate::{Config, Runner};

#[derive(Debug, Deserialize)]
pub struct Scenario {
    pub scenario_id: String,
    pub start: DateTime<Utc>,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub run: ScenarioRun,
    /// Clock never advances; sleeps are still recorded.
    #[serde(default)]
    pub frozen_clock: bool,
    #[serde(default)]
    pub faults: Faults,
    pub expect: ScenarioExpected,
}

/// Overrides applied on top of the default config.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ScenarioRun {
    pub period_minutes: Option<u32>,
    pub verify_times: Option<u32>,
    pub deadline_minutes: Option<u64>,
    pub namespaces: Option<Vec<String>>,
    pub verify_mode: Option<VerifyMode>,
    pub on_missed_boundary: Option<MissedBoundary>,
}

#[derive(Debug, Deserialize)]
pub struct ScenarioExpected {
    /// `pass` or `fail`.
    pub verdict: String,
    #[serde(default)]
    pub failed_phase: Option<String>,
    #[serde(default)]
    pub failure_kind: Option<String>,
    #[serde(default)]
    pub cadence_lengths: Option<Vec<usize>>,
    #[serde(default)]
    pub message_contains: Option<String>,
}

#[derive(Debug)]
pub struct ScenarioResult {
    pub report: RunReport,
    /// Platform operations in call order, e.g. `create_restore:restore-...`.
    pub calls: Vec<String>,
    pub total_slept: Duration,
}

pub fn load_scenario(dir: &Path) -> Result<Scenario> {
    let p = dir.join("scenario.yaml");
    let s = std::fs::read_to_string(&p).with_context(|| format!("read scenario.yaml: {}", p.display()))?;
    let sc: Scenario = serde_yaml::from_str(&s).with_context(|| format!("parse {}", p.display()))?;
    Ok(sc)
}

impl Scenario {
    pub fn config(&self) -> Config {
        let mut cfg = Config::default_config();
        let r = &self.run;
        if let Some(p) = r.period_minutes {
            cfg.run.period_minutes = p;
        }
        if let Some(v) = r.verify_times {
            cfg.run.verify_times = v;
        }
        if let Some(d) = r.deadline_minutes {
            cfg.run.deadline_minutes = d;
        }
        if let Some(ns) = &r.namespaces {
            cfg.run.namespaces = ns.clone();
        }
        if let Some(m) = r.verify_mode {
            cfg.verify.mode = m;
        }
        if let Some(m) = r.on_missed_boundary {
            cfg.aligner.on_missed_boundary = m;
        }
        cfg.run.seed = self.seed;
        cfg
    }
}

/// Run a scenario end to end against the simulated platform on a virtual clock.
pub fn simulate(dir: &Path) -> Result<ScenarioResult> {
    let sc = load_scenario(dir)?;
    let clock = VirtualClock::starting_at(sc.start);
    if sc.frozen_clock {
        clock.freeze();
    }
    let platform = Arc::new(SimulatedPlatform::with_faults(Arc::new(clock.clone()), sc.faults.clone()));
    let mut runner = Runner::with_parts(sc.config(), platform.clone(), Arc::new(clock.clone()));
    let report = runner.run();
    Ok(ScenarioResult { report, calls: platform.calls(), total_slept: clock.total_slept() })
}

impl ScenarioExpected {
    /// Compare a report with the expectations; the error lists every mismatch.
    pub fn check(&self, report: &RunReport) -> Result<()> {
        let mut problems = Vec::new();
        match (self.verdict.as_str(), &report.verdict) {
            ("pass", Verdict::Pass) => {}
            ("fail", Verdict::Fail { phase, kind, message }) => {
                if let Some(want) = &self.failed_phase {
                    if want != phase.as_str() {
                        problems.push(format!("failed phase {phase}, expected {want}"));
                    }
                }
                if let Some(want) = &self.failure_kind {
                    let got = format!("{kind:?}").to_lowercase();
                    if *want != got {
                        problems.push(format!("failure kind {got}, expected {want}"));
                    }
                }
                if let Some(want) = &self.message_contains {
                    if !message.contains(want.as_str()) {
                        problems.push(format!("message {message:?} lacks {want:?}"));
                    }
                }
            }
            (want, got) => problems.push(format!("verdict {got:?}, expected {want}")),
        }
        if let Some(want) = &self.cadence_lengths {
            let got = report.cadence_lengths();
            if *want != got {
                problems.push(format!("cadence lengths {got:?}, expected {want:?}"));
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(anyhow!(problems.join("; ")))
        }
    }
}
