//! Conversions from CLI output into the shapes the runner consumes.

use std::collections::BTreeMap;

use anyhow::{anyhow, Context, Result};
use cadence_core::{CadenceError, ManagedResource};

/// Convert `velero backup get` table output into `<name>,<created>` ledger lines.
///
/// Columns: NAME STATUS ERRORS WARNINGS CREATED(4 tokens) EXPIRES STORAGE-LOCATION SELECTOR.
pub fn backup_table_to_ledger_lines(table: &str) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    for row in table.lines() {
        let tokens: Vec<&str> = row.split_whitespace().collect();
        match tokens.first() {
            None => continue,
            Some(&"NAME") => continue,
            Some(_) if row.trim_start().starts_with("No backups found") => continue,
            _ => {}
        }
        if tokens.len() < 8 {
            return Err(CadenceError::Parse {
                subject: "backup table row".to_string(),
                value: row.to_string(),
                reason: format!("expected at least 8 columns, found {}", tokens.len()),
            }
            .into());
        }
        lines.push(format!("{},{}", tokens[0], tokens[4..8].join(" ")));
    }
    Ok(lines)
}

/// Extract `.status.phase` from `velero restore get -o json`.
pub fn restore_phase_from_json(json: &str) -> Result<String> {
    let v: serde_json::Value = serde_json::from_str(json).context("parse restore json")?;
    v.pointer("/status/phase")
        .and_then(|p| p.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow!("restore json has no status.phase"))
}

/// Build a resource from `kubectl get configmap -o json`.
pub fn configmap_from_json(json: &str) -> Result<ManagedResource> {
    let v: serde_json::Value = serde_json::from_str(json).context("parse configmap json")?;
    let name = v
        .pointer("/metadata/name")
        .and_then(|n| n.as_str())
        .ok_or_else(|| anyhow!("configmap json has no metadata.name"))?
        .to_string();
    let data = v
        .get("data")
        .and_then(|d| d.as_object())
        .map(|obj| {
            obj.iter()
                .map(|(k, v)| (k.clone(), v.as_str().unwrap_or_default().to_string()))
                .collect::<BTreeMap<_, _>>()
        })
        .unwrap_or_default();
    Ok(ManagedResource { name, data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::parse_ledger_lines;

    const TABLE: &str = "\
NAME                                        STATUS      ERRORS   WARNINGS   CREATED                         EXPIRES   STORAGE LOCATION   SELECTOR
schedule-9f1c-20240101120900   Completed   0        0          2024-01-01 12:09:00 +0000 UTC   29d       default            <none>
schedule-9f1c-20240101120600   Completed   0        0          2024-01-01 12:06:00 +0000 UTC   29d       default            <none>
";

    #[test]
    fn table_rows_become_ledger_lines() {
        let lines = backup_table_to_ledger_lines(TABLE).unwrap();
        assert_eq!(
            lines,
            vec![
                "schedule-9f1c-20240101120900,2024-01-01 12:09:00 +0000 UTC",
                "schedule-9f1c-20240101120600,2024-01-01 12:06:00 +0000 UTC",
            ]
        );
        assert_eq!(parse_ledger_lines(&lines).unwrap().len(), 2);
    }

    #[test]
    fn empty_listing_is_empty_ledger() {
        assert!(backup_table_to_ledger_lines("").unwrap().is_empty());
        assert!(backup_table_to_ledger_lines("No backups found.\n").unwrap().is_empty());
    }

    #[test]
    fn truncated_row_is_rejected() {
        let err = backup_table_to_ledger_lines("schedule-x Completed 0 0\n").unwrap_err();
        assert!(matches!(err.downcast_ref::<CadenceError>(), Some(CadenceError::Parse { .. })));
    }

    #[test]
    fn reads_restore_phase() {
        let json = r#"{"metadata":{"name":"r"},"status":{"phase":"PartiallyFailed"}}"#;
        assert_eq!(restore_phase_from_json(json).unwrap(), "PartiallyFailed");
        assert!(restore_phase_from_json(r#"{"status":{}}"#).is_err());
    }

    #[test]
    fn reads_configmap_data() {
        let json = r#"{"metadata":{"name":"schedule-test-ns","namespace":"ns1"},"data":{"marker":"ns1"}}"#;
        let cm = configmap_from_json(json).unwrap();
        assert_eq!(cm.name, "schedule-test-ns");
        assert_eq!(cm.data.get("marker").map(String::as_str), Some("ns1"));

        let bare = configmap_from_json(r#"{"metadata":{"name":"x"}}"#).unwrap();
        assert!(bare.data.is_empty());
    }
}
