use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cadence_core::RunId;

use crate::manifest::{EvidenceKind, RunManifest};

pub trait ArtifactStore: Send + Sync {
    fn create_run_dir(&self, run_id: &RunId) -> Result<PathBuf>;
    fn write_manifest(&self, run_dir: &Path, manifest: &RunManifest) -> Result<()>;
    fn append_worklog(&self, run_dir: &Path, line: &str) -> Result<()>;
    fn write_evidence(&self, run_dir: &Path, kind: EvidenceKind, name: &str, bytes: &[u8]) -> Result<PathBuf>;
}

#[derive(Clone)]
pub struct FsArtifactStore {
    pub root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn kind_dir(kind: EvidenceKind) -> &'static str {
        match kind {
            EvidenceKind::Ledger => "ledger",
            EvidenceKind::Restore => "restore",
        }
    }
}

impl ArtifactStore for FsArtifactStore {
    fn create_run_dir(&self, run_id: &RunId) -> Result<PathBuf> {
        let dir = self.root.join(run_id.as_str());
        std::fs::create_dir_all(&dir).with_context(|| format!("create run dir {}", dir.display()))?;
        Ok(dir)
    }

    fn write_manifest(&self, run_dir: &Path, manifest: &RunManifest) -> Result<()> {
        let path = run_dir.join("run_manifest.json");
        let bytes = serde_json::to_vec_pretty(manifest)?;
        std::fs::write(&path, bytes).with_context(|| format!("write manifest {}", path.display()))?;
        Ok(())
    }

    fn append_worklog(&self, run_dir: &Path, line: &str) -> Result<()> {
        let path = run_dir.join("worklog.md");
        use std::io::Write;
        let mut f = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(f, "{}", line)?;
        Ok(())
    }

    fn write_evidence(&self, run_dir: &Path, kind: EvidenceKind, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let dir = run_dir.join(Self::kind_dir(kind));
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(name);
        std::fs::write(&path, bytes)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::{RestoreName, RunReport, ScheduleName, Verdict};
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    #[test]
    fn writes_manifest_worklog_and_evidence() {
        let dir = tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path().to_path_buf());
        let run_dir = store.create_run_dir(&RunId::from_str("r")).unwrap();
        store.append_worklog(&run_dir, "- init: pass").unwrap();
        store.append_worklog(&run_dir, "- activate: pass").unwrap();
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        store
            .write_manifest(
                &run_dir,
                &RunManifest::new(
                    "simulated",
                    RunReport {
                        run_id: RunId::from_str("r"),
                        schedule_name: ScheduleName::from_str("schedule-x"),
                        restore_name: RestoreName::from_str("restore-x"),
                        period_minutes: 3,
                        verify_times: 5,
                        started_at: at,
                        finished_at: at,
                        schedule: None,
                        phases: vec![],
                        observations: vec![],
                        selected: None,
                        restore: None,
                        verdict: Verdict::Pass,
                    },
                ),
            )
            .unwrap();
        let p = store.write_evidence(&run_dir, EvidenceKind::Ledger, "cadence-0.txt", b"a,b").unwrap();

        assert_eq!(std::fs::read_to_string(run_dir.join("worklog.md")).unwrap().lines().count(), 2);
        let manifest: serde_json::Value =
            serde_json::from_slice(&std::fs::read(run_dir.join("run_manifest.json")).unwrap()).unwrap();
        assert_eq!(manifest["report"]["schedule_name"], "schedule-x");
        assert_eq!(manifest["platform"], "simulated");
        assert!(p.ends_with("ledger/cadence-0.txt"));
    }
}
