//! Result documents returned for every operation.
//!
//! Every document carries `status: success|failure`. Failures add
//! `error_code` and `error_message`; restore failures also name the stage
//! that failed and any units already recovered.

use crate::catalog::manifest::{Backup, BackupStatus};
use crate::catalog::CatalogEntry;
use crate::restore::{RestoreFailure, RestoreStage};
use crate::utils::errors::{AdminError, Result, Sentinel};
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Document<T> {
    Success(T),
    Failure(FailureBody),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureBody {
    pub error_code: i64,
    pub error_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<RestoreStage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub restored_units: Vec<String>,
}

/// Body of a success that has nothing else to say.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Empty {}

/// Outcome of a backup run. A run with units that failed verification is a
/// failure document that still carries the whole manifest.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BackupReport {
    Success(Backup),
    Failure(FailedBackup),
}

#[derive(Debug, Serialize)]
pub struct FailedBackup {
    pub error_code: i64,
    pub error_message: String,
    #[serde(flatten)]
    pub backup: Backup,
}

#[derive(Debug, Serialize)]
pub struct BackupList {
    pub backups: Vec<Document<Backup>>,
}

impl From<&AdminError> for FailureBody {
    fn from(err: &AdminError) -> Self {
        FailureBody {
            error_code: err.error_code(),
            error_message: err.to_string(),
            backup_id: None,
            stage: None,
            restored_units: Vec::new(),
        }
    }
}

impl From<RestoreFailure> for FailureBody {
    fn from(failure: RestoreFailure) -> Self {
        FailureBody {
            stage: Some(failure.stage),
            restored_units: failure.restored_units,
            ..FailureBody::from(&failure.error)
        }
    }
}

impl<T> Document<T> {
    pub fn failure(err: &AdminError) -> Self {
        Document::Failure(err.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Document::Success(_))
    }
}

impl<T> From<Result<T>> for Document<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(body) => Document::Success(body),
            Err(e) => Document::failure(&e),
        }
    }
}

impl From<Backup> for BackupReport {
    fn from(backup: Backup) -> Self {
        if backup.backup_status == BackupStatus::Success {
            return BackupReport::Success(backup);
        }
        FailedBackup {
            error_code: Sentinel::VerificationFailed.code(),
            error_message: format!("Verification failed for: {}", backup.failed_units().join(", ")),
            backup,
        }
        .into()
    }
}

impl From<FailedBackup> for BackupReport {
    fn from(failed: FailedBackup) -> Self {
        BackupReport::Failure(failed)
    }
}

impl From<Vec<CatalogEntry>> for BackupList {
    fn from(entries: Vec<CatalogEntry>) -> Self {
        let backups = entries
            .into_iter()
            .map(|entry| match entry.backup {
                Ok(backup) => Document::Success(backup),
                Err(e) => Document::Failure(FailureBody {
                    backup_id: Some(entry.backup_id),
                    ..FailureBody::from(&e)
                }),
            })
            .collect();
        BackupList { backups }
    }
}
