use serde::{Deserialize, Serialize};

/// Run phases in execution order. Each starts only after the previous one passed.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Phase {
    Init,
    Activate,
    PreWindowCheck,
    CadenceLoop,
    SelectAndCleanup,
    Restore,
    Verify,
}

impl Phase {
    pub const ALL: [Phase; 7] = [
        Phase::Init,
        Phase::Activate,
        Phase::PreWindowCheck,
        Phase::CadenceLoop,
        Phase::SelectAndCleanup,
        Phase::Restore,
        Phase::Verify,
    ];

    pub fn next(self) -> Option<Phase> {
        let idx = Phase::ALL.iter().position(|p| *p == self)?;
        Phase::ALL.get(idx + 1).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Init => "init",
            Phase::Activate => "activate",
            Phase::PreWindowCheck => "pre_window_check",
            Phase::CadenceLoop => "cadence_loop",
            Phase::SelectAndCleanup => "select_and_cleanup",
            Phase::Restore => "restore",
            Phase::Verify => "verify",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum PhaseStatus {
    Pass,
    Fail,
    Skipped,
}

/// How restored resources are checked.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VerifyMode {
    /// Resource can be fetched without error.
    #[default]
    Existence,
    /// Resource exists and its data matches what was created.
    Content,
}

/// What the aligner does when its bounded loop never sees a boundary.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MissedBoundary {
    #[default]
    Fail,
    /// Legacy behaviour: return without activating.
    Skip,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum RestorePhase {
    New,
    InProgress,
    Completed,
    PartiallyFailed,
    Failed,
    FailedValidation,
    Other(String),
}

impl RestorePhase {
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "New" => RestorePhase::New,
            "InProgress" => RestorePhase::InProgress,
            "Completed" => RestorePhase::Completed,
            "PartiallyFailed" => RestorePhase::PartiallyFailed,
            "Failed" => RestorePhase::Failed,
            "FailedValidation" => RestorePhase::FailedValidation,
            other => RestorePhase::Other(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_chain_in_order() {
        let mut p = Phase::Init;
        let mut seen = vec![p];
        while let Some(n) = p.next() {
            seen.push(n);
            p = n;
        }
        assert_eq!(seen, Phase::ALL.to_vec());
        assert_eq!(Phase::Verify.next(), None);
    }

    #[test]
    fn restore_phase_parses_known_and_unknown() {
        assert_eq!(RestorePhase::parse("Completed\n"), RestorePhase::Completed);
        assert_eq!(RestorePhase::parse("Weird"), RestorePhase::Other("Weird".into()));
    }
}
