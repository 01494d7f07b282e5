//! Manifest types for committed backups.
//!
//! A manifest records every unit copied into a backup directory together with
//! its verification outcome. It is serialized as `manifest.json` in the
//! directory and never rewritten.

use crate::units::{UnitKind, SYSTEM_UNITS};
use crate::verify::{Verdict, VerdictStatus};
use serde::{Deserialize, Serialize};

/// File name of the manifest inside each backup directory.
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backup {
    pub backup_id: String,
    pub backup_name: String,
    pub backup_date: String,
    pub backup_comment: Option<String>,
    pub backup_status: BackupStatus,
    pub units: Vec<BackupUnitRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupUnitRecord {
    pub kind: UnitKind,
    /// Logical name as the engine reports it.
    pub name: String,
    /// Path as the engine reported it at backup time.
    pub file_name: String,
    pub verification: VerdictStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_message: Option<String>,
    /// Previous backup of this unit, empty when there was none.
    #[serde(default)]
    pub last_backup: String,
}

impl BackupUnitRecord {
    pub fn new(kind: UnitKind, name: &str, file_name: &str, verdict: Verdict, last_backup: Option<&str>) -> Self {
        BackupUnitRecord {
            kind,
            name: name.to_string(),
            file_name: file_name.to_string(),
            verification: verdict.status,
            verification_message: verdict.diagnostic.filter(|_| verdict.status != VerdictStatus::Ok),
            last_backup: last_backup.unwrap_or_default().to_string(),
        }
    }
}

impl Backup {
    /// Units whose copy did not verify cleanly.
    pub fn failed_units(&self) -> Vec<&str> {
        self.units
            .iter()
            .filter(|u| u.verification != VerdictStatus::Ok)
            .map(|u| u.name.as_str())
            .collect()
    }

    /// Builds a manifest whose status follows from the unit verdicts.
    pub fn assemble(
        backup_id: String,
        backup_name: Option<String>,
        backup_date: String,
        backup_comment: Option<String>,
        units: Vec<BackupUnitRecord>,
    ) -> Self {
        let backup_status = if units.iter().all(|u| u.verification == VerdictStatus::Ok) {
            BackupStatus::Success
        } else {
            BackupStatus::Failure
        };
        Backup {
            backup_name: backup_name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| backup_id.clone()),
            backup_id,
            backup_date,
            backup_comment,
            backup_status,
            units,
        }
    }

    pub fn unit(&self, kind: UnitKind) -> Option<&BackupUnitRecord> {
        self.units.iter().find(|u| u.kind == kind)
    }

    /// System units the manifest does not reference.
    pub fn missing_system_units(&self) -> Vec<UnitKind> {
        SYSTEM_UNITS
            .iter()
            .copied()
            .filter(|kind| self.unit(*kind).is_none())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: UnitKind, name: &str, verdict: Verdict) -> BackupUnitRecord {
        BackupUnitRecord::new(kind, name, &format!("{}.dbf", name.to_lowercase()), verdict, None)
    }

    #[test]
    fn test_status_follows_verdicts() {
        let all_ok = Backup::assemble(
            "2024-01-01T00:00:00.000000".into(),
            None,
            "2024-01-01 00:00:00.000000".into(),
            None,
            vec![
                record(UnitKind::SystemCatalog, "SYSDB", Verdict::ok()),
                record(UnitKind::UserData, "ORDERS", Verdict::ok()),
            ],
        );
        assert_eq!(all_ok.backup_status, BackupStatus::Success);
        assert_eq!(all_ok.backup_name, all_ok.backup_id);

        for bad in [Verdict::warning("w"), Verdict::error("e")] {
            let backup = Backup::assemble(
                "id".into(),
                Some("nightly".into()),
                "date".into(),
                None,
                vec![
                    record(UnitKind::SystemCatalog, "SYSDB", Verdict::ok()),
                    record(UnitKind::UserData, "ORDERS", bad),
                ],
            );
            assert_eq!(backup.backup_status, BackupStatus::Failure);
            assert_eq!(backup.backup_name, "nightly");
        }
    }

    #[test]
    fn test_diagnostic_only_kept_for_failures() {
        let rec = BackupUnitRecord::new(
            UnitKind::UserData,
            "ORDERS",
            "orders.dbf",
            Verdict::error("bad page"),
            Some("2023-12-31 10:00:00"),
        );
        assert_eq!(rec.verification_message.as_deref(), Some("bad page"));
        assert_eq!(rec.last_backup, "2023-12-31 10:00:00");

        let ok = BackupUnitRecord::new(UnitKind::UserData, "ORDERS", "orders.dbf", Verdict::ok(), None);
        assert!(ok.verification_message.is_none());
        assert_eq!(ok.last_backup, "");
    }

    #[test]
    fn test_manifest_field_names() {
        let backup = Backup::assemble(
            "id".into(),
            None,
            "date".into(),
            Some("before upgrade".into()),
            vec![record(UnitKind::TransactionLog, "TRANSDB", Verdict::ok())],
        );
        let json = serde_json::to_value(&backup).unwrap();
        assert_eq!(json["backup_status"], "success");
        assert_eq!(json["backup_comment"], "before upgrade");
        assert_eq!(json["units"][0]["kind"], "transaction_log");
        assert_eq!(json["units"][0]["verification"], "OK");
        assert!(json["units"][0].get("verification_message").is_none());
    }

    #[test]
    fn test_missing_system_units() {
        let backup = Backup::assemble(
            "id".into(),
            None,
            "date".into(),
            None,
            vec![
                record(UnitKind::SystemCatalog, "SYSDB", Verdict::ok()),
                record(UnitKind::RecoveryLog, "LOGDB", Verdict::ok()),
            ],
        );
        assert_eq!(
            backup.missing_system_units(),
            vec![UnitKind::TransactionLog, UnitKind::SchemaCatalog]
        );
    }
}
