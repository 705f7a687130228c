use serde::{Deserialize, Serialize};

use cadence_core::RunReport;

/// Raw evidence captured alongside the manifest.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum EvidenceKind {
    /// Ledger listing exactly as the platform returned it.
    Ledger,
    Restore,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunManifest {
    pub tool_version: String,
    pub platform: String,
    pub report: RunReport,
}

impl RunManifest {
    pub fn new(platform: impl Into<String>, report: RunReport) -> Self {
        Self {
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            platform: platform.into(),
            report,
        }
    }
}
