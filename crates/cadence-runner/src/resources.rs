use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{info, warn};

use cadence_core::{CadenceError, ManagedResource, VerifyMode};

use crate::context::RunContext;

/// The resource created in `namespace`; its data is what a content check compares against.
pub fn expected_resource(name: &str, namespace: &str) -> ManagedResource {
    ManagedResource {
        name: name.to_string(),
        data: BTreeMap::from([
            ("namespace".to_string(), namespace.to_string()),
            ("marker".to_string(), "schedule-cadence".to_string()),
        ]),
    }
}

/// Create every target namespace with its resource, then wait until each is readable.
pub fn create_managed_resources(ctx: &RunContext) -> Result<(), CadenceError> {
    let name = &ctx.run.resource_name;
    for ns in &ctx.run.namespaces {
        let res = expected_resource(name, ns);
        ctx.call("namespace create", |p, budget| p.create_namespace(ns, budget))?;
        ctx.call("configmap create", |p, budget| p.create_resource(ns, &res, budget))?;
    }
    let poll = Duration::from_secs(ctx.cfg.verify.ready_poll_secs);
    for ns in &ctx.run.namespaces {
        let mut ready = false;
        for _ in 0..ctx.cfg.verify.ready_poll_max {
            if ctx.call("configmap get", |p, budget| p.get_resource(ns, name, budget))?.is_some() {
                ready = true;
                break;
            }
            ctx.sleep(poll, "resource ready")?;
        }
        if !ready {
            return Err(CadenceError::assertion(format!("resource {ns}/{name} ready"), "present", "absent"));
        }
    }
    info!(namespaces = ?ctx.run.namespaces, resource = %name, "managed resources ready");
    Ok(())
}

/// Delete the target namespaces and wait for them to be gone.
pub fn teardown_namespaces(ctx: &RunContext) -> Result<(), CadenceError> {
    for ns in &ctx.run.namespaces {
        ctx.call("namespace delete", |p, budget| p.delete_namespace(ns, budget))?;
    }
    let poll = Duration::from_secs(ctx.cfg.cleanup.namespace_poll_secs);
    for ns in &ctx.run.namespaces {
        let mut gone = false;
        for _ in 0..ctx.cfg.cleanup.namespace_poll_max {
            if !ctx.call("namespace get", |p, budget| p.namespace_exists(ns, budget))? {
                gone = true;
                break;
            }
            ctx.sleep(poll, "namespace teardown")?;
        }
        if !gone {
            return Err(CadenceError::assertion(format!("namespace {ns} deleted"), "absent", "still present"));
        }
    }
    info!(namespaces = ?ctx.run.namespaces, "namespaces torn down");
    Ok(())
}

/// Every namespace must have its resource back; in content mode the data must match too.
pub fn verify_restored(ctx: &RunContext, mode: VerifyMode) -> Result<(), CadenceError> {
    let name = &ctx.run.resource_name;
    let mut problems = Vec::new();
    for ns in &ctx.run.namespaces {
        match ctx.call("configmap get", |p, budget| p.get_resource(ns, name, budget))? {
            None => problems.push(format!("{ns}: missing")),
            Some(got) if mode == VerifyMode::Content && got != expected_resource(name, ns) => {
                warn!(namespace = %ns, data = ?got.data, "restored resource differs");
                problems.push(format!("{ns}: data mismatch"));
            }
            Some(_) => {}
        }
    }
    if !problems.is_empty() {
        return Err(CadenceError::assertion(
            format!("restored {name}"),
            format!("present in {}", ctx.run.namespaces.join(",")),
            problems.join("; "),
        ));
    }
    info!(resource = %name, ?mode, "restored resources verified");
    Ok(())
}
