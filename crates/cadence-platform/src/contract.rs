use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{anyhow, Result};
use cadence_core::{
    aligner_max_checks, parse_creation_timestamp, parse_ledger_lines, Clock, ManagedResource, Period, RestoreName,
    RestorePhase, ScheduleName, ScheduleSpec,
};

use crate::types::Platform;

const CALL_BUDGET: Duration = Duration::from_secs(600);
const ALIGN_POLL: Duration = Duration::from_secs(30);

/// Shared adapter contract suite: one schedule, one tick, one restore.
///
/// Takes about two periods of wall-clock time against a live platform; with a virtual
/// clock it is instant.
pub fn run_platform_contract_suite(platform: &dyn Platform, clock: &dyn Clock, namespace: &str, period: Period) -> Result<()> {
    let resource = ManagedResource {
        name: "contract-cm".to_string(),
        data: BTreeMap::from([("marker".to_string(), "contract".to_string())]),
    };
    platform.create_namespace(namespace, CALL_BUDGET)?;
    platform.create_resource(namespace, &resource, CALL_BUDGET)?;
    if platform.get_resource(namespace, &resource.name, CALL_BUDGET)? != Some(resource.clone()) {
        return Err(anyhow!("created resource not readable back"));
    }

    // start just past a boundary so the first tick is a full period away
    let max_checks = aligner_max_checks(period, ALIGN_POLL);
    let mut checks = 0;
    while !period.is_boundary(clock.now()) {
        if checks == max_checks {
            return Err(anyhow!("no period boundary after {max_checks} checks; is the clock moving?"));
        }
        clock.sleep(ALIGN_POLL);
        checks += 1;
    }
    let name = ScheduleName::new();
    let activated_at = clock.now();
    let spec = ScheduleSpec { name: name.clone(), namespaces: vec![namespace.to_string()], cron: period.cron_expr() };
    platform.create_schedule(&spec, CALL_BUDGET)?;
    let created_at = parse_creation_timestamp(name.as_str(), &platform.schedule_creation_timestamp(&name, CALL_BUDGET)?)?;
    if (created_at - activated_at).num_seconds().abs() >= 60 {
        return Err(anyhow!("creation timestamp {created_at} not within a minute of {activated_at}"));
    }

    let first = platform.list_ledger("contract", &name, CALL_BUDGET)?;
    if !first.is_empty() {
        return Err(anyhow!("expected empty ledger right after activation, got {first:?}"));
    }
    if platform.list_ledger("contract", &name, CALL_BUDGET)? != first {
        return Err(anyhow!("back-to-back ledger reads differ"));
    }

    clock.sleep(period.as_duration() + Duration::from_secs(60));
    let ledger = parse_ledger_lines(&platform.list_ledger("contract", &name, CALL_BUDGET)?)?;
    if ledger.len() != 1 {
        return Err(anyhow!("expected exactly one snapshot after one period, got {}", ledger.len()));
    }

    platform.delete_namespace(namespace, CALL_BUDGET)?;
    let mut gone = false;
    for _ in 0..60 {
        if !platform.namespace_exists(namespace, CALL_BUDGET)? {
            gone = true;
            break;
        }
        clock.sleep(Duration::from_secs(5));
    }
    if !gone {
        return Err(anyhow!("namespace {namespace} still present after delete"));
    }

    let phase = platform.create_restore(&RestoreName::new(), &ledger.records[0].id.normalized(), CALL_BUDGET)?;
    if phase != RestorePhase::Completed {
        return Err(anyhow!("restore ended in {phase:?}"));
    }
    if platform.get_resource(namespace, &resource.name, CALL_BUDGET)?.is_none() {
        return Err(anyhow!("resource missing after restore"));
    }

    platform.delete_schedule(&name, CALL_BUDGET)?;
    platform.delete_namespace(namespace, CALL_BUDGET)?;
    Ok(())
}
