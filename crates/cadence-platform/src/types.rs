use std::time::Duration;

use anyhow::Result;
use cadence_core::{ManagedResource, RestoreName, RestorePhase, ScheduleName, ScheduleSpec, SnapshotId};

/// Command and query surface of the platform under test.
///
/// The run only observes schedule and ledger state; every mutating call is issued once.
/// Any `Err` is fatal to the run.
///
/// `budget` is the most wall-clock time a call may block; adapters give up with
/// `CadenceError::CommandTimedOut` once it is spent.
pub trait Platform: Send + Sync {
    fn name(&self) -> &str;

    fn create_namespace(&self, namespace: &str, budget: Duration) -> Result<()>;

    fn namespace_exists(&self, namespace: &str, budget: Duration) -> Result<bool>;

    /// Request deletion; callers poll `namespace_exists` until it is gone.
    fn delete_namespace(&self, namespace: &str, budget: Duration) -> Result<()>;

    fn create_resource(&self, namespace: &str, resource: &ManagedResource, budget: Duration) -> Result<()>;

    /// `Ok(None)` when the resource (or its namespace) does not exist.
    fn get_resource(&self, namespace: &str, name: &str, budget: Duration) -> Result<Option<ManagedResource>>;

    fn create_schedule(&self, spec: &ScheduleSpec, budget: Duration) -> Result<()>;

    /// Raw creation timestamp as printed by the platform (RFC 3339 in single quotes).
    fn schedule_creation_timestamp(&self, name: &ScheduleName, budget: Duration) -> Result<String>;

    fn delete_schedule(&self, name: &ScheduleName, budget: Duration) -> Result<()>;

    /// Current ledger as `<identifier>,<timestamp>` lines, read fresh on every call.
    fn list_ledger(&self, scope: &str, schedule: &ScheduleName, budget: Duration) -> Result<Vec<String>>;

    /// Restore and block until the platform reports a terminal phase.
    fn create_restore(&self, restore: &RestoreName, snapshot: &SnapshotId, budget: Duration) -> Result<RestorePhase>;
}
