use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::{DateTime, SecondsFormat, Timelike, Utc};
use serde::Deserialize;

use cadence_core::{
    format_ledger_timestamp, CadenceError, Clock, ManagedResource, Period, RestoreName, RestorePhase, ScheduleName,
    ScheduleSpec, SnapshotId,
};

use crate::types::Platform;

/// Misbehaviour injected into the simulated platform. Tick indices are 0-based and count
/// period boundaries after schedule creation.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Faults {
    pub skip_ticks: Vec<usize>,
    pub duplicate_ticks: Vec<usize>,
    /// Emit a snapshot at the creation instant instead of waiting for the first boundary.
    pub immediate_snapshot: bool,
    pub malformed_timestamp_tick: Option<usize>,
    pub creation_skew_secs: i64,
    /// Snapshot becomes visible this long after its boundary.
    pub tick_latency_secs: u64,
    /// Operation names (e.g. `create_schedule`, `list_ledger`) that always error.
    pub fail_operations: Vec<String>,
    pub unrestored_namespaces: Vec<String>,
    pub restore_phase: Option<String>,
    pub restore_duration_secs: u64,
    pub corrupt_restore_data: bool,
    /// Namespaces that ignore deletion requests.
    pub sticky_namespaces: Vec<String>,
}

type NamespaceState = BTreeMap<String, BTreeMap<String, ManagedResource>>;

#[derive(Clone, Debug)]
struct SimSnapshot {
    id: SnapshotId,
    created_at: DateTime<Utc>,
    malformed: bool,
    contents: NamespaceState,
}

#[derive(Clone, Debug)]
struct SimSchedule {
    spec: ScheduleSpec,
    period: Period,
    created_at: DateTime<Utc>,
    last_boundary: DateTime<Utc>,
    ticks: usize,
    snapshots: Vec<SimSnapshot>,
}

#[derive(Default)]
struct Inner {
    namespaces: NamespaceState,
    schedules: BTreeMap<String, SimSchedule>,
    calls: Vec<String>,
}

/// In-process stand-in for a cluster running a cron snapshot scheduler.
///
/// Time comes from the injected clock; boundaries that have passed since the last call are
/// materialized lazily, capturing the namespace state current at that call.
pub struct SimulatedPlatform {
    clock: Arc<dyn Clock>,
    faults: Faults,
    inner: Mutex<Inner>,
}

impl SimulatedPlatform {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_faults(clock, Faults::default())
    }

    pub fn with_faults(clock: Arc<dyn Clock>, faults: Faults) -> Self {
        Self { clock, faults, inner: Mutex::new(Inner::default()) }
    }

    /// Every operation invoked so far, in order, e.g. `list_ledger:schedule-x`.
    pub fn calls(&self) -> Vec<String> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self, op: &str) -> usize {
        let prefix = format!("{op}:");
        self.inner.lock().unwrap().calls.iter().filter(|c| c.starts_with(&prefix)).count()
    }

    pub fn has_schedule(&self, name: &ScheduleName) -> bool {
        self.inner.lock().unwrap().schedules.contains_key(name.as_str())
    }

    fn enter(&self, op: &str, subject: &str) -> Result<std::sync::MutexGuard<'_, Inner>> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(format!("{op}:{subject}"));
        if self.faults.fail_operations.iter().any(|f| f == op) {
            return Err(anyhow!("simulated failure: {op} {subject}"));
        }
        let now = self.clock.now();
        let latency = chrono::Duration::seconds(self.faults.tick_latency_secs as i64);
        let Inner { namespaces, schedules, .. } = &mut *inner;
        for sched in schedules.values_mut() {
            self.materialize(sched, namespaces, now, latency);
        }
        Ok(inner)
    }

    fn materialize(&self, sched: &mut SimSchedule, namespaces: &NamespaceState, now: DateTime<Utc>, latency: chrono::Duration) {
        loop {
            let boundary = next_boundary(sched.last_boundary, sched.period);
            if boundary + latency > now {
                break;
            }
            let tick = sched.ticks;
            sched.ticks += 1;
            sched.last_boundary = boundary;
            if self.faults.skip_ticks.contains(&tick) {
                continue;
            }
            let contents = capture(namespaces, &sched.spec.namespaces);
            let malformed = self.faults.malformed_timestamp_tick == Some(tick);
            sched.snapshots.push(SimSnapshot {
                id: SnapshotId::from_str(format!("{}-{}", sched.spec.name, boundary.format("%Y%m%d%H%M%S"))),
                created_at: boundary,
                malformed,
                contents: contents.clone(),
            });
            if self.faults.duplicate_ticks.contains(&tick) {
                sched.snapshots.push(SimSnapshot {
                    id: SnapshotId::from_str(format!("{}-{}-dup", sched.spec.name, boundary.format("%Y%m%d%H%M%S"))),
                    created_at: boundary,
                    malformed,
                    contents,
                });
            }
        }
    }
}

/// First minute boundary strictly after `after` whose minute-of-hour is a multiple of the period.
fn next_boundary(after: DateTime<Utc>, period: Period) -> DateTime<Utc> {
    let floor = after
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(after);
    let mut b = floor + chrono::Duration::minutes(1);
    while !period.is_boundary(b) {
        b += chrono::Duration::minutes(1);
    }
    b
}

fn capture(namespaces: &NamespaceState, included: &[String]) -> NamespaceState {
    namespaces
        .iter()
        .filter(|(ns, _)| included.contains(ns))
        .map(|(ns, res)| (ns.clone(), res.clone()))
        .collect()
}

fn period_from_cron(cron: &str) -> Result<Period> {
    let step = cron
        .split_whitespace()
        .next()
        .and_then(|f| f.strip_prefix("*/"))
        .ok_or_else(|| anyhow!("unsupported cron expression {cron:?}; expected `*/N * * * *`"))?;
    let minutes: u32 = step.parse().map_err(|_| anyhow!("bad cron step in {cron:?}"))?;
    Ok(Period::new(minutes)?)
}

impl Platform for SimulatedPlatform {
    fn name(&self) -> &str {
        "simulated"
    }

    fn create_namespace(&self, namespace: &str, _budget: Duration) -> Result<()> {
        let mut inner = self.enter("create_namespace", namespace)?;
        if inner.namespaces.contains_key(namespace) {
            return Err(anyhow!("namespace {namespace} already exists"));
        }
        inner.namespaces.insert(namespace.to_string(), BTreeMap::new());
        Ok(())
    }

    fn namespace_exists(&self, namespace: &str, _budget: Duration) -> Result<bool> {
        let inner = self.enter("namespace_exists", namespace)?;
        Ok(inner.namespaces.contains_key(namespace))
    }

    fn delete_namespace(&self, namespace: &str, _budget: Duration) -> Result<()> {
        let mut inner = self.enter("delete_namespace", namespace)?;
        if !self.faults.sticky_namespaces.iter().any(|n| n == namespace) {
            inner.namespaces.remove(namespace);
        }
        Ok(())
    }

    fn create_resource(&self, namespace: &str, resource: &ManagedResource, _budget: Duration) -> Result<()> {
        let mut inner = self.enter("create_resource", namespace)?;
        let ns = inner
            .namespaces
            .get_mut(namespace)
            .ok_or_else(|| anyhow!("namespace {namespace} not found"))?;
        ns.insert(resource.name.clone(), resource.clone());
        Ok(())
    }

    fn get_resource(&self, namespace: &str, name: &str, _budget: Duration) -> Result<Option<ManagedResource>> {
        let inner = self.enter("get_resource", namespace)?;
        Ok(inner.namespaces.get(namespace).and_then(|ns| ns.get(name)).cloned())
    }

    fn create_schedule(&self, spec: &ScheduleSpec, _budget: Duration) -> Result<()> {
        let mut inner = self.enter("create_schedule", spec.name.as_str())?;
        if inner.schedules.contains_key(spec.name.as_str()) {
            return Err(anyhow!("schedule {} already exists", spec.name));
        }
        let period = period_from_cron(&spec.cron)?;
        let now = self.clock.now() + chrono::Duration::seconds(self.faults.creation_skew_secs);
        let created_at = now.with_nanosecond(0).unwrap_or(now);
        let mut snapshots = vec![];
        if self.faults.immediate_snapshot {
            snapshots.push(SimSnapshot {
                id: SnapshotId::from_str(format!("{}-{}", spec.name, created_at.format("%Y%m%d%H%M%S"))),
                created_at,
                malformed: false,
                contents: capture(&inner.namespaces, &spec.namespaces),
            });
        }
        inner.schedules.insert(
            spec.name.as_str().to_string(),
            SimSchedule {
                spec: spec.clone(),
                period,
                created_at,
                last_boundary: self.clock.now(),
                ticks: 0,
                snapshots,
            },
        );
        Ok(())
    }

    fn schedule_creation_timestamp(&self, name: &ScheduleName, _budget: Duration) -> Result<String> {
        let inner = self.enter("schedule_creation_timestamp", name.as_str())?;
        let sched = inner
            .schedules
            .get(name.as_str())
            .ok_or_else(|| anyhow!("schedule {name} not found"))?;
        Ok(format!("'{}'", sched.created_at.to_rfc3339_opts(SecondsFormat::Secs, true)))
    }

    fn delete_schedule(&self, name: &ScheduleName, _budget: Duration) -> Result<()> {
        let mut inner = self.enter("delete_schedule", name.as_str())?;
        inner
            .schedules
            .remove(name.as_str())
            .map(|_| ())
            .ok_or_else(|| anyhow!("schedule {name} not found"))
    }

    fn list_ledger(&self, _scope: &str, schedule: &ScheduleName, _budget: Duration) -> Result<Vec<String>> {
        let inner = self.enter("list_ledger", schedule.as_str())?;
        let Some(sched) = inner.schedules.get(schedule.as_str()) else {
            return Ok(vec![]);
        };
        Ok(sched
            .snapshots
            .iter()
            .map(|s| {
                let ts = if s.malformed {
                    s.created_at.to_rfc3339()
                } else {
                    format_ledger_timestamp(s.created_at)
                };
                format!("{},{}", s.id, ts)
            })
            .collect())
    }

    fn create_restore(&self, restore: &RestoreName, snapshot: &SnapshotId, budget: Duration) -> Result<RestorePhase> {
        let contents = {
            let inner = self.enter("create_restore", restore.as_str())?;
            inner
                .schedules
                .values()
                .flat_map(|s| s.snapshots.iter())
                .find(|s| s.id == *snapshot)
                .map(|s| s.contents.clone())
                .ok_or_else(|| anyhow!("backup {snapshot} not found"))?
        };
        let duration = Duration::from_secs(self.faults.restore_duration_secs);
        if duration > budget {
            self.clock.sleep(budget);
            return Err(CadenceError::CommandTimedOut {
                command: format!("restore create {restore}"),
                after_secs: budget.as_secs(),
            }
            .into());
        }
        self.clock.sleep(duration);

        let mut inner = self.inner.lock().unwrap();
        for (ns, resources) in contents {
            if self.faults.unrestored_namespaces.contains(&ns) {
                continue;
            }
            let target = inner.namespaces.entry(ns).or_default();
            for (name, mut res) in resources {
                if self.faults.corrupt_restore_data {
                    res.data.insert("corrupted".to_string(), "true".to_string());
                }
                target.insert(name, res);
            }
        }
        Ok(self
            .faults
            .restore_phase
            .as_deref()
            .map(RestorePhase::parse)
            .unwrap_or(RestorePhase::Completed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::{parse_ledger_lines, VirtualClock};
    use chrono::TimeZone;

    const B: Duration = Duration::from_secs(60);

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, m, s).unwrap()
    }

    fn spec(name: &str) -> ScheduleSpec {
        ScheduleSpec {
            name: ScheduleName::from_str(name),
            namespaces: vec!["ns1".into()],
            cron: "*/3 * * * *".into(),
        }
    }

    #[test]
    fn next_boundary_is_strictly_after() {
        let p = Period::new(3).unwrap();
        assert_eq!(next_boundary(at(12, 3, 0), p), at(12, 6, 0));
        assert_eq!(next_boundary(at(12, 3, 20), p), at(12, 6, 0));
        assert_eq!(next_boundary(at(12, 58, 1), p), at(13, 0, 0));
    }

    #[test]
    fn ledger_grows_one_per_boundary() {
        let clock = VirtualClock::starting_at(at(12, 3, 10));
        let platform = SimulatedPlatform::new(Arc::new(clock.clone()));
        platform.create_schedule(&spec("s"), B).unwrap();
        let name = ScheduleName::from_str("s");

        clock.advance(Duration::from_secs(150));
        assert!(platform.list_ledger("velero", &name, B).unwrap().is_empty());

        clock.advance(Duration::from_secs(60));
        let lines = platform.list_ledger("velero", &name, B).unwrap();
        assert_eq!(lines, vec!["s-20240101120600,2024-01-01 12:06:00 +0000 UTC".to_string()]);

        clock.advance(Duration::from_secs(6 * 60));
        assert_eq!(parse_ledger_lines(&platform.list_ledger("velero", &name, B).unwrap()).unwrap().len(), 3);
    }

    #[test]
    fn skipped_and_duplicated_ticks() {
        let clock = VirtualClock::starting_at(at(12, 0, 5));
        let faults = Faults { skip_ticks: vec![0], duplicate_ticks: vec![1], ..Faults::default() };
        let platform = SimulatedPlatform::with_faults(Arc::new(clock.clone()), faults);
        platform.create_schedule(&spec("s"), B).unwrap();
        clock.advance(Duration::from_secs(7 * 60));
        let lines = platform.list_ledger("velero", &ScheduleName::from_str("s"), B).unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("s-20240101120600-dup,"));
    }

    #[test]
    fn restore_brings_back_captured_namespaces() {
        let clock = VirtualClock::starting_at(at(12, 0, 5));
        let platform = SimulatedPlatform::new(Arc::new(clock.clone()));
        let res = ManagedResource { name: "cm".into(), data: BTreeMap::from([("k".into(), "v".into())]) };
        platform.create_namespace("ns1", B).unwrap();
        platform.create_resource("ns1", &res, B).unwrap();
        platform.create_schedule(&spec("s"), B).unwrap();
        clock.advance(Duration::from_secs(4 * 60));
        let ledger = parse_ledger_lines(&platform.list_ledger("velero", &ScheduleName::from_str("s"), B).unwrap()).unwrap();

        platform.delete_namespace("ns1", B).unwrap();
        assert!(!platform.namespace_exists("ns1", B).unwrap());

        let phase = platform.create_restore(&RestoreName::from_str("r"), &ledger.records[0].id, B).unwrap();
        assert_eq!(phase, RestorePhase::Completed);
        assert_eq!(platform.get_resource("ns1", "cm", B).unwrap(), Some(res));
    }

    #[test]
    fn failing_operation_errors_and_is_recorded() {
        let clock = VirtualClock::starting_at(at(12, 0, 0));
        let faults = Faults { fail_operations: vec!["create_schedule".into()], ..Faults::default() };
        let platform = SimulatedPlatform::with_faults(Arc::new(clock), faults);
        assert!(platform.create_schedule(&spec("s"), B).is_err());
        assert_eq!(platform.call_count("create_schedule"), 1);
        assert!(!platform.has_schedule(&ScheduleName::from_str("s")));
    }

    #[test]
    fn slow_restore_gives_up_at_its_budget() {
        let clock = VirtualClock::starting_at(at(12, 0, 5));
        let faults = Faults { restore_duration_secs: 7200, ..Faults::default() };
        let platform = SimulatedPlatform::with_faults(Arc::new(clock.clone()), faults);
        platform.create_schedule(&spec("s"), B).unwrap();
        clock.advance(Duration::from_secs(4 * 60));
        let ledger = parse_ledger_lines(&platform.list_ledger("velero", &ScheduleName::from_str("s"), B).unwrap()).unwrap();

        let budget = Duration::from_secs(600);
        let err = platform.create_restore(&RestoreName::from_str("r"), &ledger.records[0].id, budget).unwrap_err();
        assert!(matches!(err.downcast_ref::<CadenceError>(), Some(CadenceError::CommandTimedOut { after_secs: 600, .. })));
        assert_eq!(clock.total_slept(), budget);
    }

    #[test]
    fn rejects_non_step_cron() {
        assert!(period_from_cron("0 * * * *").is_err());
        assert!(period_from_cron("*/7 * * * *").is_err());
        assert_eq!(period_from_cron("*/5 * * * *").unwrap().minutes(), 5);
    }
}
