//! Restoring a database from the backup catalog.
//!
//! A restore runs as a fixed sequence of stages. Each stage either succeeds
//! or ends the restore with a [`RestoreFailure`] naming the stage; nothing is
//! retried. Live state is only touched once the backup has been resolved,
//! validated and fully re-verified.
//!
//! Two modes are supported:
//!
//! - **Full restore**: the server is killed and every backed-up unit,
//!   transaction log included, replaces the live file.
//! - **Log replay**: the live recovery log (and optionally the live
//!   transaction log) is kept, the system catalog is rolled forward from the
//!   log while the server is down, and every user unit is recovered from the
//!   log after restart. Only the latest backup can anchor a replay.

pub mod quiesce;

use crate::catalog::manifest::{Backup, BackupUnitRecord};
use crate::catalog::BackupCatalog;
use crate::control::DatabaseControl;
use crate::process::CommandOutput;
use crate::session::{statements, Credentials, ScopedSession, SessionFactory};
use crate::units::{file_name_of, live_location, UnitKind};
use crate::utils::errors::{AdminError, Result, Sentinel};
use crate::verify::IntegrityVerifier;
use quiesce::{next_quiesce_action, QuiesceAction, StopAttempt};
use serde::Serialize;
use std::fmt;
use std::fs::{self, File, FileTimes};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

/// What the SQL shell prints once the system catalog has been rolled forward.
const REPLAY_SUCCESS_TRAILER: &str = "Databank SYSDB has been restored from log SQL>";
/// What it prints when the log holds nothing newer than the restored catalog.
const REPLAY_NOTHING_TO_APPLY: &str = "SQL>Y SQL&";

#[derive(Debug, Clone)]
pub struct RestoreRequest {
    pub database: String,
    pub credentials: Credentials,
    /// Latest backup when absent.
    pub backup_id: Option<String>,
    pub replay_log: bool,
    /// Only meaningful together with `replay_log`.
    pub keep_transaction_log: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreStage {
    Resolving,
    Validating,
    Verifying,
    Stopping,
    PlacingFiles,
    ReplayingLog,
    Starting,
    RestoringUnits,
    Done,
}

impl fmt::Display for RestoreStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RestoreStage::Resolving => "resolving",
            RestoreStage::Validating => "validating",
            RestoreStage::Verifying => "verifying",
            RestoreStage::Stopping => "stopping",
            RestoreStage::PlacingFiles => "placing_files",
            RestoreStage::ReplayingLog => "replaying_log",
            RestoreStage::Starting => "starting",
            RestoreStage::RestoringUnits => "restoring_units",
            RestoreStage::Done => "done",
        })
    }
}

/// A validated backup and what to do with each of its units.
#[derive(Debug, Clone)]
pub struct RestorePlan {
    pub backup_id: String,
    pub backup: Backup,
    pub replay_log: bool,
    pub keep_transaction_log: bool,
    /// Units copied over their live files.
    pub copy: Vec<BackupUnitRecord>,
    /// Units whose live file is kept.
    pub skip: Vec<UnitKind>,
}

impl RestorePlan {
    fn new(backup_id: String, backup: Backup, replay_log: bool, keep_transaction_log: bool) -> Self {
        let keep_transaction_log = replay_log && keep_transaction_log;
        let mut skip = Vec::new();
        if replay_log {
            skip.push(UnitKind::RecoveryLog);
        }
        if keep_transaction_log {
            skip.push(UnitKind::TransactionLog);
        }
        let copy = backup
            .units
            .iter()
            .filter(|u| !skip.contains(&u.kind))
            .cloned()
            .collect();
        RestorePlan {
            backup_id,
            backup,
            replay_log,
            keep_transaction_log,
            copy,
            skip,
        }
    }

    /// Validation guarantees every system unit is present.
    fn system_unit(&self, kind: UnitKind) -> Result<&BackupUnitRecord> {
        self.backup.unit(kind).ok_or_else(|| {
            AdminError::sequence(
                Sentinel::IncompleteBackup,
                format!("Backup {} has no {} unit", self.backup_id, kind),
            )
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RestoreOutcome {
    pub backup_id: String,
    pub replayed_log: bool,
    /// User units recovered from the log after restart.
    pub restored_units: Vec<String>,
}

#[derive(Debug, Error)]
#[error("restore failed while {stage}: {error}")]
pub struct RestoreFailure {
    pub stage: RestoreStage,
    pub error: AdminError,
    /// Units already recovered when unit recovery stopped.
    pub restored_units: Vec<String>,
}

fn failed_at(stage: RestoreStage) -> impl FnOnce(AdminError) -> RestoreFailure {
    move |error| {
        warn!(stage = %stage, code = error.error_code(), "Restore failed: {}", error);
        RestoreFailure {
            stage,
            error,
            restored_units: Vec::new(),
        }
    }
}

pub struct RestoreOrchestrator<'a> {
    control: &'a dyn DatabaseControl,
    sessions: &'a dyn SessionFactory,
    verifier: &'a dyn IntegrityVerifier,
    catalog: &'a BackupCatalog,
}

impl<'a> RestoreOrchestrator<'a> {
    pub fn new(
        control: &'a dyn DatabaseControl,
        sessions: &'a dyn SessionFactory,
        verifier: &'a dyn IntegrityVerifier,
        catalog: &'a BackupCatalog,
    ) -> Self {
        Self {
            control,
            sessions,
            verifier,
            catalog,
        }
    }

    pub fn restore(&self, request: &RestoreRequest) -> std::result::Result<RestoreOutcome, RestoreFailure> {
        let db = request.database.as_str();
        info!(database = %db, replay_log = request.replay_log, "Starting restore");

        let backup_id = self.resolve(request).map_err(failed_at(RestoreStage::Resolving))?;

        let plan = self
            .validate(request, backup_id)
            .map_err(failed_at(RestoreStage::Validating))?;
        info!(database = %db, backup_id = %plan.backup_id, "Restoring from backup");

        self.verify_backup(&plan).map_err(failed_at(RestoreStage::Verifying))?;
        self.quiesce(db, plan.replay_log).map_err(failed_at(RestoreStage::Stopping))?;

        self.place_files(db, &plan).map_err(failed_at(RestoreStage::PlacingFiles))?;

        if plan.replay_log {
            self.replay_catalog(request, &plan)
                .map_err(failed_at(RestoreStage::ReplayingLog))?;
        }

        self.control.start(db).map_err(failed_at(RestoreStage::Starting))?;

        let mut restored_units = Vec::new();
        if plan.replay_log {
            if let Err(error) = self.restore_units(request, &mut restored_units) {
                let mut failure = failed_at(RestoreStage::RestoringUnits)(error);
                failure.restored_units = restored_units;
                return Err(failure);
            }
        }

        info!(database = %db, backup_id = %plan.backup_id, stage = %RestoreStage::Done, "Restore complete");
        Ok(RestoreOutcome {
            backup_id: plan.backup_id,
            replayed_log: plan.replay_log,
            restored_units,
        })
    }

    /// Picks the backup. A replay can only start from the newest one.
    fn resolve(&self, request: &RestoreRequest) -> Result<String> {
        let requested = request.backup_id.as_deref().filter(|id| !id.trim().is_empty());
        match requested {
            Some(id) if !request.replay_log => Ok(id.to_string()),
            _ => {
                let latest = self.catalog.latest()?;
                match requested {
                    Some(id) if id != latest => Err(AdminError::sequence(
                        Sentinel::StaleBackupId,
                        format!(
                            "The named backup {} is not the latest. The latest backup is {}. \
                             Log replay can only start from the latest backup",
                            id, latest
                        ),
                    )),
                    _ => Ok(latest),
                }
            }
        }
    }

    fn validate(&self, request: &RestoreRequest, backup_id: String) -> Result<RestorePlan> {
        let backup = self.catalog.read(&backup_id)?;
        let missing = backup.missing_system_units();
        if !missing.is_empty() {
            let names: Vec<String> = missing.iter().map(|k| k.to_string()).collect();
            return Err(AdminError::sequence(
                Sentinel::IncompleteBackup,
                format!(
                    "Backup {} does not contain all system units, missing {}",
                    backup_id,
                    names.join(", ")
                ),
            ));
        }
        Ok(RestorePlan::new(
            backup_id,
            backup,
            request.replay_log,
            request.keep_transaction_log,
        ))
    }

    /// Re-checks every copy against the backup's own system catalog.
    fn verify_backup(&self, plan: &RestorePlan) -> Result<()> {
        let dir = self.catalog.backup_dir(&plan.backup_id);
        let catalog_file = dir.join(file_name_of(&plan.system_unit(UnitKind::SystemCatalog)?.file_name));
        for unit in &plan.backup.units {
            let verdict = self
                .verifier
                .verify(&dir.join(file_name_of(&unit.file_name)), &catalog_file);
            if !verdict.is_ok() {
                return Err(AdminError::Verification {
                    unit: unit.name.clone(),
                    diagnostic: verdict.diagnostic_text().to_string(),
                });
            }
        }
        Ok(())
    }

    fn quiesce(&self, db: &str, replay_log: bool) -> Result<()> {
        let state = self
            .control
            .status(db)
            .map_err(|e| {
                AdminError::sequence(
                    Sentinel::StatusUnavailable,
                    format!("Unknown state of the database: {}", e),
                )
            })?
            .status;

        let mut last = None;
        let mut last_error = String::new();
        loop {
            match next_quiesce_action(replay_log, &state, last) {
                QuiesceAction::Proceed => return Ok(()),
                QuiesceAction::Stop { force } => {
                    let result = self.control.stop(db, force);
                    if let Err(e) = &result {
                        warn!(database = %db, force, "Stop request failed: {}", e);
                        last_error = e.to_string();
                    }
                    last = Some(StopAttempt {
                        forced: force,
                        succeeded: result.is_ok(),
                    });
                }
                QuiesceAction::Abort(Sentinel::UnknownState) => {
                    return Err(AdminError::sequence(
                        Sentinel::UnknownState,
                        format!("Unknown database state: {}", state.label()),
                    ))
                }
                QuiesceAction::Abort(sentinel) => {
                    return Err(AdminError::sequence(
                        sentinel,
                        format!("Could not stop database: {}", last_error),
                    ))
                }
            }
        }
    }

    /// Checks the live logs the restore keeps, then copies the rest over.
    fn place_files(&self, db: &str, plan: &RestorePlan) -> Result<()> {
        let data_dir = self.control.data_directory(db).map_err(|e| {
            AdminError::sequence(
                Sentinel::DataDirUnknown,
                format!("Could not find the database directory: {}", e),
            )
        })?;

        if plan.replay_log {
            let live_catalog = live_location(&plan.system_unit(UnitKind::SystemCatalog)?.file_name, &data_dir);
            self.verify_live(plan.system_unit(UnitKind::RecoveryLog)?, &live_catalog, &data_dir)?;
            if plan.keep_transaction_log {
                self.verify_live(plan.system_unit(UnitKind::TransactionLog)?, &live_catalog, &data_dir)?;
            }
        }

        let backup_dir = self.catalog.backup_dir(&plan.backup_id);
        for unit in &plan.copy {
            let source = backup_dir.join(file_name_of(&unit.file_name));
            let target = live_location(&unit.file_name, &data_dir);
            copy_preserving_times(&source, &target)?;
            info!(database = %db, unit = %unit.name, "Placed {}", target.display());
        }
        Ok(())
    }

    fn verify_live(&self, unit: &BackupUnitRecord, live_catalog: &Path, data_dir: &Path) -> Result<()> {
        let verdict = self
            .verifier
            .verify(&live_location(&unit.file_name, data_dir), live_catalog);
        if verdict.is_ok() {
            return Ok(());
        }
        Err(AdminError::Verification {
            unit: format!("live {}", unit.name),
            diagnostic: verdict.diagnostic_text().to_string(),
        })
    }

    fn replay_catalog(&self, request: &RestoreRequest, plan: &RestorePlan) -> Result<()> {
        let output = self
            .control
            .replay_catalog_log(&request.database, &request.credentials)?;
        judge_replay(&output, &plan.backup_id)
    }

    /// Recovers every user unit of the restarted database from the log.
    fn restore_units(&self, request: &RestoreRequest, restored: &mut Vec<String>) -> Result<()> {
        let mut session = ScopedSession::open(self.sessions, &request.database, &request.credentials)?;
        let units = session.storage_units()?;
        for unit in units.iter().filter(|u| !u.kind.is_system()) {
            session.execute(&statements::restore_unit_from_log(&unit.name))?;
            info!(database = %request.database, unit = %unit.name, "Recovered unit from log");
            restored.push(unit.name.clone());
        }
        Ok(())
    }
}

/// The replay command exits 0 even when it did nothing, so its output has to
/// end with the success trailer.
fn judge_replay(output: &CommandOutput, backup_id: &str) -> Result<()> {
    let flat = output.stdout.replace('\n', " ");
    let flat = flat.trim();
    if output.success() && flat.ends_with(REPLAY_SUCCESS_TRAILER) {
        return Ok(());
    }

    let advice = format!(
        "Fix it manually or restore backup {} without log replay",
        backup_id
    );
    if flat == REPLAY_NOTHING_TO_APPLY {
        return Err(AdminError::sequence(
            Sentinel::NoLogToApply,
            format!(
                "Could not restore the system catalog from the log: illegal restore sequence, no log to apply. {}",
                advice
            ),
        ));
    }
    let message = format!(
        "Could not restore the system catalog from the log: {}. {}",
        if flat.is_empty() { output.message() } else { flat.to_string() },
        advice
    );
    if output.success() {
        Err(AdminError::sequence(Sentinel::LogReplayFailed, message))
    } else {
        Err(AdminError::Control {
            code: output.exit_code(),
            message,
        })
    }
}

/// Copies a file and carries over its access and modification times.
fn copy_preserving_times(source: &Path, target: &Path) -> Result<()> {
    fs::copy(source, target).map_err(|e| AdminError::io_at(source, e))?;
    let meta = fs::metadata(source).map_err(|e| AdminError::io_at(source, e))?;
    let times = FileTimes::new()
        .set_accessed(meta.accessed().map_err(|e| AdminError::io_at(source, e))?)
        .set_modified(meta.modified().map_err(|e| AdminError::io_at(source, e))?);
    File::options()
        .write(true)
        .open(target)
        .and_then(|f| f.set_times(times))
        .map_err(|e| AdminError::io_at(target, e))
}
