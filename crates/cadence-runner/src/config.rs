use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use cadence_core::{
    CadenceError, MissedBoundary, Period, RestoreName, RunId, ScheduleName, TestRun, Timeline, VerifyMode,
};
use cadence_velero::VeleroSettings;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub run: RunConfig,
    #[serde(default)]
    pub aligner: AlignerConfig,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub verify: VerifyConfig,
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunConfig {
    pub period_minutes: u32,
    pub verify_times: u32,
    pub deadline_minutes: u64,
    pub namespaces: Vec<String>,
    /// Name of the config map created in every namespace.
    pub resource_name: String,
    /// Namespace the ledger is listed from.
    pub ledger_scope: String,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignerConfig {
    pub poll_interval_secs: u64,
    pub on_missed_boundary: MissedBoundary,
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self { poll_interval_secs: 30, on_missed_boundary: MissedBoundary::Fail }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub settle_delay_secs: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self { settle_delay_secs: 60 }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    pub mode: VerifyMode,
    pub ready_poll_secs: u64,
    pub ready_poll_max: u32,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self { mode: VerifyMode::Existence, ready_poll_secs: 2, ready_poll_max: 30 }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub velero_bin: String,
    pub velero_namespace: String,
    pub kubectl_bin: String,
    pub kubeconfig: Option<String>,
    pub command_timeout_secs: u64,
    pub debug_on_failure: bool,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            velero_bin: "velero".to_string(),
            velero_namespace: "velero".to_string(),
            kubectl_bin: "kubectl".to_string(),
            kubeconfig: None,
            command_timeout_secs: 3600,
            debug_on_failure: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    pub delete_schedule: bool,
    pub namespace_poll_secs: u64,
    pub namespace_poll_max: u32,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self { delete_schedule: true, namespace_poll_secs: 5, namespace_poll_max: 60 }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Evidence directory; nothing is written when unset.
    pub dir: Option<String>,
}

impl Config {
    pub fn default_config() -> Self {
        Self {
            run: RunConfig {
                period_minutes: 3,
                verify_times: 5,
                deadline_minutes: 60,
                namespaces: vec!["ns1".to_string()],
                resource_name: "schedule-test-ns".to_string(),
                ledger_scope: "velero".to_string(),
                seed: None,
            },
            aligner: AlignerConfig::default(),
            window: WindowConfig::default(),
            verify: VerifyConfig::default(),
            platform: PlatformConfig::default(),
            cleanup: CleanupConfig::default(),
            report: ReportConfig::default(),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: Config = toml::from_str(&s).with_context(|| format!("parse {}", path.display()))?;
        Ok(cfg)
    }

    /// Load `path` when it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Self::default_config())
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let s = toml::to_string_pretty(self).with_context(|| "serialize toml")?;
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    pub fn default_path(dir: &Path) -> PathBuf {
        dir.join("cadence.toml")
    }

    pub fn period(&self) -> Result<Period, CadenceError> {
        Period::new(self.run.period_minutes)
    }

    pub fn aligner_poll(&self) -> Duration {
        Duration::from_secs(self.aligner.poll_interval_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.window.settle_delay_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.platform.command_timeout_secs)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.run.deadline_minutes * 60)
    }

    pub fn timeline(&self) -> Result<Timeline, CadenceError> {
        Ok(Timeline::plan(self.period()?, self.run.verify_times, self.aligner_poll(), self.settle_delay()))
    }

    pub fn validate(&self) -> Result<(), CadenceError> {
        let invalid = |msg: String| Err(CadenceError::InvalidConfig(msg));
        self.period()?;
        if self.run.verify_times == 0 {
            return invalid("run.verify_times must be at least 1".to_string());
        }
        if self.run.namespaces.is_empty() {
            return invalid("run.namespaces must name at least one namespace".to_string());
        }
        let mut seen = BTreeSet::new();
        for ns in &self.run.namespaces {
            if ns.trim().is_empty() || !seen.insert(ns.as_str()) {
                return invalid(format!("run.namespaces has an empty or duplicate entry {ns:?}"));
            }
        }
        if self.run.resource_name.trim().is_empty() {
            return invalid("run.resource_name must not be empty".to_string());
        }
        if self.aligner.poll_interval_secs == 0
            || self.verify.ready_poll_secs == 0
            || self.cleanup.namespace_poll_secs == 0
        {
            return invalid("poll intervals must be at least one second".to_string());
        }
        let needed = self.timeline()?.worst_case_duration();
        if needed >= self.deadline() {
            return invalid(format!(
                "run.deadline_minutes={} is shorter than the planned run ({}s before restore)",
                self.run.deadline_minutes,
                needed.as_secs()
            ));
        }
        Ok(())
    }

    /// Validate and materialize the immutable per-run context.
    pub fn test_run(&self, run_id: RunId, schedule_name: ScheduleName, restore_name: RestoreName) -> Result<TestRun, CadenceError> {
        self.validate()?;
        Ok(TestRun {
            run_id,
            schedule_name,
            restore_name,
            namespaces: self.run.namespaces.clone(),
            resource_name: self.run.resource_name.clone(),
            ledger_scope: self.run.ledger_scope.clone(),
            period: self.period()?,
            verify_times: self.run.verify_times,
            deadline: self.deadline(),
        })
    }

    pub fn velero_settings(&self) -> VeleroSettings {
        VeleroSettings {
            velero_bin: self.platform.velero_bin.clone(),
            velero_namespace: self.platform.velero_namespace.clone(),
            kubectl_bin: self.platform.kubectl_bin.clone(),
            kubeconfig: self.platform.kubeconfig.as_deref().map(expand_path),
            command_timeout: self.command_timeout(),
            debug_on_failure: self.platform.debug_on_failure,
        }
    }

    pub fn report_dir(&self) -> Option<PathBuf> {
        self.report.dir.as_deref().map(expand_path)
    }
}

fn expand_path(s: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(s).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_is_valid() {
        Config::default_config().validate().unwrap();
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = Config::default_path(dir.path());
        let mut cfg = Config::default_config();
        cfg.run.namespaces = vec!["a".into(), "b".into()];
        cfg.verify.mode = VerifyMode::Content;
        cfg.save_to(&path).unwrap();
        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.run.namespaces, vec!["a", "b"]);
        assert_eq!(loaded.verify.mode, VerifyMode::Content);
    }

    #[test]
    fn partial_file_takes_section_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cadence.toml");
        std::fs::write(
            &path,
            r#"
[run]
period_minutes = 5
verify_times = 2
deadline_minutes = 45
namespaces = ["ns1"]
resource_name = "cm"
ledger_scope = "velero"

[aligner]
on_missed_boundary = "skip"
"#,
        )
        .unwrap();
        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg.aligner.on_missed_boundary, MissedBoundary::Skip);
        assert_eq!(cfg.aligner.poll_interval_secs, 30);
        assert_eq!(cfg.platform.velero_bin, "velero");
        assert!(cfg.cleanup.delete_schedule);
        cfg.validate().unwrap();
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let cfg = Config::load_or_default(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(cfg.run.period_minutes, 3);
    }

    #[test]
    fn rejects_bad_values() {
        let mut cfg = Config::default_config();
        cfg.run.period_minutes = 7;
        assert!(matches!(cfg.validate(), Err(CadenceError::InvalidPeriod(7))));

        let mut cfg = Config::default_config();
        cfg.run.namespaces = vec!["ns1".into(), "ns1".into()];
        assert!(matches!(cfg.validate(), Err(CadenceError::InvalidConfig(_))));

        let mut cfg = Config::default_config();
        cfg.run.verify_times = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default_config();
        cfg.run.deadline_minutes = 15;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("shorter than the planned run"));
    }

    #[test]
    fn report_dir_expands_home() {
        let mut cfg = Config::default_config();
        assert!(cfg.report_dir().is_none());
        cfg.report.dir = Some("~/cadence-runs".into());
        let dir = cfg.report_dir().unwrap();
        assert!(dir.ends_with("cadence-runs"));
    }
}
