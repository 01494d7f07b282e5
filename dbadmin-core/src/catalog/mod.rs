//! Filesystem-backed catalog of backups.
//!
//! Layout: one directory per backup under the catalog root, named by the
//! backup id, holding the unit copies and a single manifest. Backup ids sort
//! chronologically, so directory name order is creation order.

pub mod manifest;

use crate::utils::errors::{AdminError, Result, Sentinel};
use manifest::{Backup, MANIFEST_FILE};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// A freshly created, still empty backup directory.
#[derive(Debug, Clone)]
pub struct BackupHandle {
    pub backup_id: String,
    pub dir: PathBuf,
}

/// One catalog directory and whatever could be read from it.
#[derive(Debug)]
pub struct CatalogEntry {
    pub backup_id: String,
    pub backup: Result<Backup>,
}

#[derive(Debug, Clone)]
pub struct BackupCatalog {
    root: PathBuf,
}

impl BackupCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn backup_dir(&self, backup_id: &str) -> PathBuf {
        self.root.join(backup_id)
    }

    /// Creates the directory for a new backup. Fails if it already exists.
    pub fn create(&self, backup_id: &str) -> Result<BackupHandle> {
        check_id(backup_id)?;
        let dir = self.backup_dir(backup_id);
        fs::create_dir(&dir).map_err(|e| AdminError::io_at(&dir, e))?;
        info!(backup_id = %backup_id, "Created backup directory {}", dir.display());
        Ok(BackupHandle {
            backup_id: backup_id.to_string(),
            dir,
        })
    }

    /// Writes the manifest next to the unit copies. The file appears
    /// atomically: readers see either nothing or the complete document.
    pub fn write_manifest(&self, handle: &BackupHandle, backup: &Backup) -> Result<()> {
        let json = serde_json::to_string_pretty(backup).map_err(|e| AdminError::Filesystem {
            code: -1,
            message: format!("could not serialize manifest: {}", e),
        })?;

        let final_path = handle.dir.join(MANIFEST_FILE);
        let tmp_path = handle.dir.join(format!(".{}.tmp", MANIFEST_FILE));
        {
            let mut file = fs::File::create(&tmp_path).map_err(|e| AdminError::io_at(&tmp_path, e))?;
            file.write_all(json.as_bytes())
                .and_then(|_| file.sync_all())
                .map_err(|e| AdminError::io_at(&tmp_path, e))?;
        }
        fs::rename(&tmp_path, &final_path).map_err(|e| AdminError::io_at(&final_path, e))?;
        Ok(())
    }

    pub fn read(&self, backup_id: &str) -> Result<Backup> {
        let manifest_path = self.manifest_path(backup_id)?;
        let content = fs::read_to_string(&manifest_path).map_err(|e| AdminError::io_at(&manifest_path, e))?;
        serde_json::from_str(&content).map_err(|e| AdminError::Filesystem {
            code: -1,
            message: format!("invalid manifest {}: {}", manifest_path.display(), e),
        })
    }

    /// Every backup directory, ascending by id.
    pub fn list_ids(&self) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            return Err(AdminError::sequence(
                Sentinel::InvalidLocation,
                format!("Invalid backup location: {}", self.root.display()),
            ));
        }
        let mut ids: Vec<String> = fs::read_dir(&self.root)
            .map_err(|e| AdminError::io_at(&self.root, e))?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Every backup directory with its manifest; unreadable ones are kept and
    /// carry the read error.
    pub fn list(&self) -> Result<Vec<CatalogEntry>> {
        Ok(self
            .list_ids()?
            .into_iter()
            .map(|backup_id| {
                let backup = self.read(&backup_id);
                if let Err(e) = &backup {
                    warn!(backup_id = %backup_id, "Unreadable backup in catalog: {}", e);
                }
                CatalogEntry { backup_id, backup }
            })
            .collect())
    }

    /// Newest backup id. Every directory counts, readable or not.
    pub fn latest(&self) -> Result<String> {
        self.list_ids()?.pop().ok_or_else(|| {
            AdminError::sequence(
                Sentinel::EmptyCatalog,
                format!("No backups found in {}", self.root.display()),
            )
        })
    }

    /// Removes a backup. Refuses directories without a manifest.
    pub fn delete(&self, backup_id: &str) -> Result<()> {
        self.manifest_path(backup_id)?;
        let dir = self.backup_dir(backup_id);
        fs::remove_dir_all(&dir).map_err(|e| AdminError::io_at(&dir, e))?;
        info!(backup_id = %backup_id, "Deleted backup");
        Ok(())
    }

    /// Path of an existing manifest, or NotFound.
    fn manifest_path(&self, backup_id: &str) -> Result<PathBuf> {
        check_id(backup_id)?;
        let dir = self.backup_dir(backup_id);
        if !dir.is_dir() {
            return Err(AdminError::not_found(format!("Backup not found: {}", backup_id)));
        }
        let path = dir.join(MANIFEST_FILE);
        if !path.is_file() {
            return Err(AdminError::not_found(format!(
                "Invalid backup, {} not found in {}",
                MANIFEST_FILE, backup_id
            )));
        }
        Ok(path)
    }
}

/// Backup ids are single path components.
fn check_id(backup_id: &str) -> Result<()> {
    let mut components = Path::new(backup_id).components();
    match (components.next(), components.next()) {
        (Some(std::path::Component::Normal(_)), None) => Ok(()),
        _ => Err(AdminError::not_found(format!("Backup not found: {}", backup_id))),
    }
}
