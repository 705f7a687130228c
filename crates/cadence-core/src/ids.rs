use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident, $prefix:expr) => {
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Fresh identifier, unique per call.
            pub fn new() -> Self {
                Self(format!("{}{}", $prefix, Uuid::new_v4()))
            }
            pub fn from_str(s: impl Into<String>) -> Self {
                Self(s.into())
            }
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

id_newtype!(RunId, "");
id_newtype!(ScheduleName, "schedule-");
id_newtype!(RestoreName, "restore-");
id_newtype!(SnapshotId, "snapshot-");

impl SnapshotId {
    /// Strip incidental whitespace picked up from tabular CLI output.
    pub fn normalized(&self) -> SnapshotId {
        SnapshotId(self.0.chars().filter(|c| !c.is_whitespace()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_names_carry_prefix_and_differ() {
        let a = ScheduleName::new();
        let b = ScheduleName::new();
        assert!(a.as_str().starts_with("schedule-"));
        assert_ne!(a, b);
        assert!(RestoreName::new().as_str().starts_with("restore-"));
    }

    #[test]
    fn normalized_snapshot_id_drops_all_whitespace() {
        let id = SnapshotId::from_str(" schedule-abc-2024 0101120600\t");
        assert_eq!(id.normalized().as_str(), "schedule-abc-20240101120600");
    }
}
