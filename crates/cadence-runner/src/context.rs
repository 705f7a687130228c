use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use cadence_artifacts::{ArtifactStore, EvidenceKind, FsArtifactStore};
use cadence_core::{CadenceError, Clock, TestRun};
use cadence_platform::Platform;

use crate::{deadline::Deadline, Config};

/// Where a run writes its manifest, worklog and raw evidence.
#[derive(Clone)]
pub struct Evidence {
    pub store: FsArtifactStore,
    pub run_dir: PathBuf,
}

/// Immutable per-run context handed to every component.
pub struct RunContext {
    pub run: TestRun,
    pub cfg: Config,
    pub platform: Arc<dyn Platform>,
    pub clock: Arc<dyn Clock>,
    pub deadline: Deadline,
    pub evidence: Option<Evidence>,
}

impl RunContext {
    /// Issue one platform call. It may block for at most the time left before the deadline;
    /// running out of that time is reported as the deadline, not as a command failure.
    pub fn call<T>(
        &self,
        operation: &str,
        f: impl FnOnce(&dyn Platform, Duration) -> anyhow::Result<T>,
    ) -> Result<T, CadenceError> {
        self.deadline.check(operation)?;
        let budget = self.deadline.remaining();
        debug!(operation, budget_secs = budget.as_secs(), "platform call");
        match f(self.platform.as_ref(), budget) {
            Ok(out) => {
                self.deadline.check(operation)?;
                Ok(out)
            }
            Err(e) => {
                self.deadline.check(operation)?;
                Err(command_error(operation, e))
            }
        }
    }

    pub fn sleep(&self, d: Duration, during: &str) -> Result<(), CadenceError> {
        debug!(secs = d.as_secs(), during, "sleeping");
        self.deadline.sleep(d, during)
    }

    /// Best-effort; evidence problems never fail a run.
    pub fn record_evidence(&self, kind: EvidenceKind, name: &str, bytes: &[u8]) {
        if let Some(ev) = &self.evidence {
            if let Err(e) = ev.store.write_evidence(&ev.run_dir, kind, name, bytes) {
                warn!("write evidence {name}: {e:#}");
            }
        }
    }
}

/// Keep errors an adapter raised in domain terms (timeouts, parse failures); wrap the rest.
pub fn command_error(operation: &str, err: anyhow::Error) -> CadenceError {
    match err.downcast::<CadenceError>() {
        Ok(e) => e,
        Err(e) => CadenceError::Command { operation: operation.to_string(), message: format!("{e:#}") },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_timeouts_survive_wrapping() {
        let e = anyhow::Error::new(CadenceError::CommandTimedOut { command: "velero restore".into(), after_secs: 1 });
        assert!(matches!(command_error("restore create", e), CadenceError::CommandTimedOut { .. }));

        let e = anyhow::anyhow!("exit 1").context("velero schedule create");
        match command_error("schedule create", e) {
            CadenceError::Command { operation, message } => {
                assert_eq!(operation, "schedule create");
                assert!(message.contains("exit 1"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
