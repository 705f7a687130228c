use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Result;
use cadence_core::{ManagedResource, RestoreName, RestorePhase, ScheduleName, ScheduleSpec, SnapshotId};
use cadence_platform::Platform;
use tracing::{debug, warn};

use crate::codec::{backup_table_to_ledger_lines, configmap_from_json, restore_phase_from_json};
use crate::exec::{exec, run};

#[derive(Clone, Debug)]
pub struct VeleroSettings {
    pub velero_bin: String,
    pub velero_namespace: String,
    pub kubectl_bin: String,
    pub kubeconfig: Option<PathBuf>,
    pub command_timeout: Duration,
    /// Collect `velero debug` output when schedule creation fails.
    pub debug_on_failure: bool,
}

/// Drives velero and kubectl binaries. Managed resources are config maps.
#[derive(Clone, Debug)]
pub struct VeleroPlatform {
    pub settings: VeleroSettings,
}

impl VeleroPlatform {
    pub fn new(settings: VeleroSettings) -> Self {
        Self { settings }
    }

    fn with_kubeconfig(&self, mut args: Vec<String>) -> Vec<String> {
        if let Some(kc) = &self.settings.kubeconfig {
            args.push("--kubeconfig".to_string());
            args.push(kc.display().to_string());
        }
        args
    }

    fn velero_args(&self, namespace: &str, rest: &[&str]) -> Vec<String> {
        let mut args = vec!["--namespace".to_string(), namespace.to_string()];
        args.extend(rest.iter().map(|s| s.to_string()));
        self.with_kubeconfig(args)
    }

    fn kubectl_args(&self, rest: &[&str]) -> Vec<String> {
        self.with_kubeconfig(rest.iter().map(|s| s.to_string()).collect())
    }

    /// Per-command timeout: the configured one, cut short by the caller's budget.
    fn timeout(&self, budget: Duration) -> Duration {
        self.settings.command_timeout.min(budget)
    }

    fn velero(&self, rest: &[&str], budget: Duration) -> Result<String> {
        let args = self.velero_args(&self.settings.velero_namespace, rest);
        debug!(bin = %self.settings.velero_bin, ?args, "velero");
        run(&self.settings.velero_bin, &args, self.timeout(budget))
    }

    fn kubectl(&self, rest: &[&str], budget: Duration) -> Result<String> {
        let args = self.kubectl_args(rest);
        debug!(bin = %self.settings.kubectl_bin, ?args, "kubectl");
        run(&self.settings.kubectl_bin, &args, self.timeout(budget))
    }

    /// `kubectl get` that maps NotFound to `None`.
    fn kubectl_get(&self, rest: &[&str], budget: Duration) -> Result<Option<String>> {
        let args = self.kubectl_args(rest);
        debug!(bin = %self.settings.kubectl_bin, ?args, "kubectl");
        let out = exec(&self.settings.kubectl_bin, &args, self.timeout(budget))?;
        if out.success {
            return Ok(Some(out.stdout.trim().to_string()));
        }
        if out.stderr.contains("NotFound") || out.stderr.contains("not found") {
            return Ok(None);
        }
        Err(anyhow::anyhow!(
            "command failed: {} {:?}\nstdout:{}\nstderr:{}",
            self.settings.kubectl_bin,
            args,
            out.stdout,
            out.stderr
        ))
    }

    fn collect_debug(&self, budget: Duration) {
        match self.velero(&["debug"], budget) {
            Ok(out) => warn!(output = %out, "collected velero debug bundle"),
            Err(e) => warn!("velero debug failed: {e:#}"),
        }
    }
}

impl Platform for VeleroPlatform {
    fn name(&self) -> &str {
        "velero"
    }

    fn create_namespace(&self, namespace: &str, budget: Duration) -> Result<()> {
        self.kubectl(&["create", "namespace", namespace], budget)?;
        Ok(())
    }

    fn namespace_exists(&self, namespace: &str, budget: Duration) -> Result<bool> {
        Ok(self.kubectl_get(&["get", "namespace", namespace, "-o", "name"], budget)?.is_some())
    }

    fn delete_namespace(&self, namespace: &str, budget: Duration) -> Result<()> {
        self.kubectl(&["delete", "namespace", namespace, "--wait=false", "--ignore-not-found"], budget)?;
        Ok(())
    }

    fn create_resource(&self, namespace: &str, resource: &ManagedResource, budget: Duration) -> Result<()> {
        let literals: Vec<String> = resource.data.iter().map(|(k, v)| format!("--from-literal={k}={v}")).collect();
        let mut args = vec!["create", "configmap", resource.name.as_str(), "-n", namespace];
        args.extend(literals.iter().map(String::as_str));
        self.kubectl(&args, budget)?;
        Ok(())
    }

    fn get_resource(&self, namespace: &str, name: &str, budget: Duration) -> Result<Option<ManagedResource>> {
        match self.kubectl_get(&["get", "configmap", name, "-n", namespace, "-o", "json"], budget)? {
            Some(json) => Ok(Some(configmap_from_json(&json)?)),
            None => Ok(None),
        }
    }

    fn create_schedule(&self, spec: &ScheduleSpec, budget: Duration) -> Result<()> {
        let include = spec.include_namespaces();
        let schedule = format!("--schedule={}", spec.cron);
        let started = Instant::now();
        let res = self.velero(
            &["schedule", "create", spec.name.as_str(), "--include-namespaces", include.as_str(), schedule.as_str()],
            budget,
        );
        if res.is_err() && self.settings.debug_on_failure {
            let left = budget.saturating_sub(started.elapsed());
            if left.is_zero() {
                warn!("no time left to collect velero debug");
            } else {
                self.collect_debug(left);
            }
        }
        res.map(|_| ())
    }

    fn schedule_creation_timestamp(&self, name: &ScheduleName, budget: Duration) -> Result<String> {
        // jsonpath is passed without a shell, so the quotes come back in the output
        let args = [
            "get",
            "schedule",
            name.as_str(),
            "-n",
            self.settings.velero_namespace.as_str(),
            "-o",
            "jsonpath='{.metadata.creationTimestamp}'",
        ];
        self.kubectl(&args, budget)
    }

    fn delete_schedule(&self, name: &ScheduleName, budget: Duration) -> Result<()> {
        self.velero(&["schedule", "delete", name.as_str(), "--confirm"], budget)?;
        Ok(())
    }

    fn list_ledger(&self, scope: &str, schedule: &ScheduleName, budget: Duration) -> Result<Vec<String>> {
        let selector = format!("velero.io/schedule-name={}", schedule);
        let args = self.velero_args(scope, &["backup", "get", "-l", selector.as_str()]);
        debug!(bin = %self.settings.velero_bin, ?args, "velero");
        let table = run(&self.settings.velero_bin, &args, self.timeout(budget))?;
        backup_table_to_ledger_lines(&table)
    }

    fn create_restore(&self, restore: &RestoreName, snapshot: &SnapshotId, budget: Duration) -> Result<RestorePhase> {
        let started = Instant::now();
        self.velero(&["restore", "create", restore.as_str(), "--from-backup", snapshot.as_str(), "--wait"], budget)?;
        let left = budget.saturating_sub(started.elapsed());
        let json = self.velero(&["restore", "get", restore.as_str(), "-o", "json"], left)?;
        Ok(RestorePhase::parse(&restore_phase_from_json(&json)?))
    }
}
