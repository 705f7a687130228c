use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::{CadenceError, Result};
use crate::ids::SnapshotId;
use crate::timestamp::parse_ledger_timestamp;

/// One snapshot as reported by the external store. Immutable once observed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub id: SnapshotId,
    pub created_at: DateTime<FixedOffset>,
}

/// Snapshots for one schedule, in the order the store listed them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    pub records: Vec<SnapshotRecord>,
}

impl Ledger {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SnapshotRecord> {
        self.records.iter()
    }

    pub fn get(&self, index: usize) -> Option<&SnapshotRecord> {
        self.records.get(index)
    }
}

/// Parse `<identifier>,<timestamp>` lines. Blank lines are ignored; anything else that
/// does not parse fails the whole ledger.
pub fn parse_ledger_lines<S: AsRef<str>>(lines: &[S]) -> Result<Ledger> {
    let mut records = Vec::with_capacity(lines.len());
    for line in lines {
        let line = line.as_ref().trim();
        if line.is_empty() {
            continue;
        }
        let (id, ts) = line.split_once(',').ok_or_else(|| CadenceError::Parse {
            subject: "ledger line".to_string(),
            value: line.to_string(),
            reason: "expected `<identifier>,<timestamp>`".to_string(),
        })?;
        let created_at = parse_ledger_timestamp(id, ts)?;
        records.push(SnapshotRecord { id: SnapshotId::from_str(id), created_at });
    }
    Ok(Ledger { records })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lines_in_listed_order() {
        let ledger = parse_ledger_lines(&[
            "sched-20240101120900,2024-01-01 12:09:00 +0000 UTC",
            "",
            "sched-20240101120600,2024-01-01 12:06:00 +0000 UTC",
        ])
        .unwrap();
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.records[0].id.as_str(), "sched-20240101120900");
        assert_eq!(ledger.records[1].id.as_str(), "sched-20240101120600");
    }

    #[test]
    fn one_bad_timestamp_fails_the_ledger() {
        let err = parse_ledger_lines(&[
            "a,2024-01-01 12:06:00 +0000 UTC",
            "b,2024-01-01T12:09:00Z",
        ])
        .unwrap_err();
        match err {
            CadenceError::Parse { subject, .. } => assert_eq!(subject, "b"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn line_without_separator_is_rejected() {
        assert!(parse_ledger_lines(&["just-a-name"]).is_err());
    }

    #[test]
    fn empty_input_is_empty_ledger() {
        let lines: Vec<String> = vec![];
        assert!(parse_ledger_lines(&lines).unwrap().is_empty());
    }
}
