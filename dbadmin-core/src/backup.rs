//! Online backup of a live database into the catalog.
//!
//! A backup copies every storage unit through the engine's online backup
//! protocol, verifies the copies against the copied system catalog and then
//! commits a manifest. Verification problems never abort a backup; they are
//! recorded in the manifest and make its status `failure`.

use crate::catalog::manifest::{Backup, BackupUnitRecord};
use crate::catalog::BackupCatalog;
use crate::session::{statements, Credentials, ScopedSession, SessionFactory};
use crate::units::{StorageUnit, UnitKind};
use crate::utils::errors::Result;
use crate::verify::{IntegrityVerifier, Verdict};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Sortable backup id; lexicographic order is creation order.
const ID_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";
const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

#[derive(Debug, Clone)]
pub struct BackupRequest {
    pub database: String,
    pub credentials: Credentials,
    pub name: Option<String>,
    pub comment: Option<String>,
}

pub struct BackupOrchestrator<'a> {
    sessions: &'a dyn SessionFactory,
    verifier: &'a dyn IntegrityVerifier,
    catalog: &'a BackupCatalog,
}

impl<'a> BackupOrchestrator<'a> {
    pub fn new(
        sessions: &'a dyn SessionFactory,
        verifier: &'a dyn IntegrityVerifier,
        catalog: &'a BackupCatalog,
    ) -> Self {
        Self {
            sessions,
            verifier,
            catalog,
        }
    }

    /// Creates, verifies and records a new backup.
    pub fn create_backup(&self, request: &BackupRequest) -> Result<Backup> {
        let now: DateTime<Utc> = Utc::now();
        let backup_id = now.format(ID_FORMAT).to_string();
        let handle = self.catalog.create(&backup_id)?;
        info!(database = %request.database, backup_id = %backup_id, "Starting backup");

        let units = match self.copy_units(&handle.dir, request) {
            Ok(units) => units,
            Err(e) => {
                warn!(backup_id = %backup_id, "Backup failed, removing partial copy: {}", e);
                if let Err(rm) = fs::remove_dir_all(&handle.dir) {
                    warn!(backup_id = %backup_id, "Could not remove {}: {}", handle.dir.display(), rm);
                }
                return Err(e);
            }
        };

        let records = self.verify_copies(&handle.dir, &units);
        let backup = Backup::assemble(
            backup_id,
            request.name.clone(),
            now.format(DATE_FORMAT).to_string(),
            request.comment.clone(),
            records,
        );
        self.catalog.write_manifest(&handle, &backup)?;

        info!(
            database = %request.database,
            backup_id = %backup.backup_id,
            status = ?backup.backup_status,
            units = backup.units.len(),
            "Backup complete"
        );
        Ok(backup)
    }

    /// Runs the online backup protocol. Any engine error rolls the backup
    /// back before it is returned.
    fn copy_units(&self, dir: &Path, request: &BackupRequest) -> Result<Vec<StorageUnit>> {
        let mut session = ScopedSession::open(self.sessions, &request.database, &request.credentials)?;
        let units = session.storage_units()?;

        let copied = session
            .execute(statements::START_BACKUP)
            .and_then(|_| {
                units.iter().try_for_each(|unit| {
                    session.execute(&statements::backup_unit(&dir.join(unit.file_name()), &unit.name))
                })
            })
            .and_then(|_| session.execute(statements::COMMIT_BACKUP));

        if let Err(e) = copied {
            if let Err(rollback) = session.execute(statements::ROLLBACK_BACKUP) {
                warn!(database = %request.database, "Rollback after failed backup also failed: {}", rollback);
            }
            return Err(e);
        }
        Ok(units)
    }

    fn verify_copies(&self, dir: &Path, units: &[StorageUnit]) -> Vec<BackupUnitRecord> {
        let catalog_file = units
            .iter()
            .find(|u| u.kind == UnitKind::SystemCatalog)
            .map(|u| dir.join(u.file_name()));

        units
            .iter()
            .map(|unit| {
                let verdict = match &catalog_file {
                    Some(catalog_file) => self.verifier.verify(&dir.join(unit.file_name()), catalog_file),
                    None => Verdict::error("backup contains no system catalog unit to verify against"),
                };
                if !verdict.is_ok() {
                    warn!(unit = %unit.name, status = %verdict.status, "Backup copy did not verify: {}", verdict.diagnostic_text());
                }
                BackupUnitRecord::new(
                    unit.kind,
                    &unit.name,
                    &unit.file_path,
                    verdict,
                    unit.last_backup.as_deref(),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::manifest::BackupStatus;
    use crate::testing::{FakeEngine, FakeSessionFactory, FakeVerifier};
    use crate::verify::VerdictStatus;
    use std::time::Duration;
    use tempfile::TempDir;

    fn live_units() -> Vec<StorageUnit> {
        vec![
            StorageUnit::new("SYSDB", "/data/db/sysdb.dbf", Some("2024-01-01 10:00:00".into())),
            StorageUnit::new("TRANSDB", "transdb.dbf", None),
            StorageUnit::new("LOGDB", "logdb.dbf", None),
            StorageUnit::new("SQLDB", "sqldb.dbf", None),
            StorageUnit::new("ORDERS", "orders.dbf", None),
        ]
    }

    /// Fails every copy of the orders unit.
    struct RejectOrders;

    impl IntegrityVerifier for RejectOrders {
        fn verify(&self, data_file: &Path, _catalog_file: &Path) -> Verdict {
            if data_file.ends_with("orders.dbf") {
                Verdict::error("page 12: bad checksum")
            } else {
                Verdict::ok()
            }
        }
    }

    fn request() -> BackupRequest {
        BackupRequest {
            database: "shop".into(),
            credentials: Credentials::new("SYSADM", "pw"),
            name: Some("nightly".into()),
            comment: Some("before upgrade".into()),
        }
    }

    #[test]
    fn test_backup_all_ok() {
        let dir = TempDir::new().unwrap();
        let catalog = BackupCatalog::new(dir.path());
        let engine = FakeEngine::new(live_units());
        let sessions = FakeSessionFactory::new(engine.clone());
        let verifier = FakeVerifier::new();

        let backup = BackupOrchestrator::new(&sessions, &verifier, &catalog)
            .create_backup(&request())
            .unwrap();

        assert_eq!(backup.backup_status, BackupStatus::Success);
        assert_eq!(backup.backup_name, "nightly");
        assert_eq!(backup.backup_comment.as_deref(), Some("before upgrade"));
        assert_eq!(backup.units.len(), 5);
        assert_eq!(backup.units[0].last_backup, "2024-01-01 10:00:00");
        assert_eq!(backup.units[0].file_name, "/data/db/sysdb.dbf");
        assert_eq!(catalog.read(&backup.backup_id).unwrap(), backup);

        let backup_dir = catalog.backup_dir(&backup.backup_id);
        assert_eq!(
            fs::read_to_string(backup_dir.join("orders.dbf")).unwrap(),
            "copy of ORDERS"
        );
        // Every copy is checked against the copied system catalog.
        for (_, catalog_file) in verifier.checked() {
            assert_eq!(catalog_file, backup_dir.join("sysdb.dbf"));
        }

        let executed = engine.executed();
        assert_eq!(executed.first().map(String::as_str), Some("start backup"));
        assert_eq!(executed.last().map(String::as_str), Some("commit backup"));
        assert_eq!(executed.len(), 7);
        assert_eq!(engine.closed_sessions(), 1);
    }

    #[test]
    fn test_error_verdict_is_recorded() {
        let dir = TempDir::new().unwrap();
        let catalog = BackupCatalog::new(dir.path());
        let sessions = FakeSessionFactory::new(FakeEngine::new(live_units()));
        let verifier = RejectOrders;

        let backup = BackupOrchestrator::new(&sessions, &verifier, &catalog)
            .create_backup(&request())
            .unwrap();

        assert_eq!(backup.backup_status, BackupStatus::Failure);
        let orders = backup.units.iter().find(|u| u.name == "ORDERS").unwrap();
        assert_eq!(orders.verification, VerdictStatus::Error);
        assert_eq!(orders.verification_message.as_deref(), Some("page 12: bad checksum"));

        // Manifest and copies are kept.
        let stored = catalog.read(&backup.backup_id).unwrap();
        assert_eq!(stored.backup_status, BackupStatus::Failure);
        assert!(catalog.backup_dir(&backup.backup_id).join("orders.dbf").is_file());
    }

    #[test]
    fn test_engine_error_rolls_back_and_removes_copy() {
        let dir = TempDir::new().unwrap();
        let catalog = BackupCatalog::new(dir.path());
        let engine = FakeEngine::new(live_units());
        engine.fail_on("databank ORDERS", -16118);
        let sessions = FakeSessionFactory::new(engine.clone());
        let verifier = FakeVerifier::new();

        let err = BackupOrchestrator::new(&sessions, &verifier, &catalog)
            .create_backup(&request())
            .unwrap_err();

        assert_eq!(err.error_code(), -16118);
        assert_eq!(engine.executed().last().map(String::as_str), Some("rollback backup"));
        assert!(!engine.executed().iter().any(|s| s == "commit backup"));
        assert_eq!(engine.closed_sessions(), 1);
        assert!(catalog.list_ids().unwrap().is_empty());
    }

    #[test]
    fn test_login_failure() {
        let dir = TempDir::new().unwrap();
        let catalog = BackupCatalog::new(dir.path());
        let engine = FakeEngine::new(live_units());
        engine.refuse_login();
        let sessions = FakeSessionFactory::new(engine.clone());
        let verifier = FakeVerifier::new();

        let err = BackupOrchestrator::new(&sessions, &verifier, &catalog)
            .create_backup(&request())
            .unwrap_err();
        assert_eq!(err.error_code(), 90);
        assert!(engine.executed().is_empty());
        assert!(catalog.list_ids().unwrap().is_empty());
    }

    #[test]
    fn test_missing_root_is_filesystem_error() {
        let dir = TempDir::new().unwrap();
        let catalog = BackupCatalog::new(dir.path().join("missing"));
        let engine = FakeEngine::new(live_units());
        let sessions = FakeSessionFactory::new(engine.clone());
        let verifier = FakeVerifier::new();

        let err = BackupOrchestrator::new(&sessions, &verifier, &catalog)
            .create_backup(&request())
            .unwrap_err();
        assert_eq!(err.error_code(), 2);
        assert_eq!(engine.opened_sessions(), 0);
    }

    #[test]
    fn test_without_system_catalog_every_verdict_is_error() {
        let dir = TempDir::new().unwrap();
        let catalog = BackupCatalog::new(dir.path());
        let units = vec![StorageUnit::new("ORDERS", "orders.dbf", None)];
        let sessions = FakeSessionFactory::new(FakeEngine::new(units));
        let verifier = FakeVerifier::new();

        let backup = BackupOrchestrator::new(&sessions, &verifier, &catalog)
            .create_backup(&request())
            .unwrap();
        assert_eq!(backup.backup_status, BackupStatus::Failure);
        assert!(backup.units.iter().all(|u| u.verification == VerdictStatus::Error));
        assert!(verifier.checked().is_empty());
    }

    #[test]
    fn test_later_backup_lists_last() {
        let dir = TempDir::new().unwrap();
        let catalog = BackupCatalog::new(dir.path());
        let sessions = FakeSessionFactory::new(FakeEngine::new(live_units()));
        let verifier = FakeVerifier::new();
        let orchestrator = BackupOrchestrator::new(&sessions, &verifier, &catalog);

        let first = orchestrator.create_backup(&request()).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        let second = orchestrator.create_backup(&request()).unwrap();

        assert_eq!(catalog.list_ids().unwrap(), vec![first.backup_id.clone(), second.backup_id.clone()]);
        assert_eq!(catalog.latest().unwrap(), second.backup_id);
    }
}
