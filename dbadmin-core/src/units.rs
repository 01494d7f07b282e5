//! Storage units: the physical data files that make up a database.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    SystemCatalog,
    TransactionLog,
    RecoveryLog,
    SchemaCatalog,
    UserData,
}

/// The four units every complete backup must contain.
pub const SYSTEM_UNITS: [UnitKind; 4] = [
    UnitKind::SystemCatalog,
    UnitKind::TransactionLog,
    UnitKind::RecoveryLog,
    UnitKind::SchemaCatalog,
];

impl UnitKind {
    /// Classifies a unit by the logical name the engine reports for it.
    pub fn from_logical_name(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "SYSDB" => UnitKind::SystemCatalog,
            "TRANSDB" => UnitKind::TransactionLog,
            "LOGDB" => UnitKind::RecoveryLog,
            "SQLDB" => UnitKind::SchemaCatalog,
            _ => UnitKind::UserData,
        }
    }

    pub fn is_system(self) -> bool {
        self != UnitKind::UserData
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnitKind::SystemCatalog => "system catalog",
            UnitKind::TransactionLog => "transaction log",
            UnitKind::RecoveryLog => "recovery log",
            UnitKind::SchemaCatalog => "schema catalog",
            UnitKind::UserData => "user data",
        };
        f.write_str(s)
    }
}

/// A live unit as enumerated from the running database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageUnit {
    pub name: String,
    pub kind: UnitKind,
    /// File path as the engine reports it; may be bare (relative to the data
    /// directory) or absolute.
    pub file_path: String,
    /// When the unit was last backed up, if ever.
    pub last_backup: Option<String>,
}

impl StorageUnit {
    pub fn new(name: impl Into<String>, file_path: impl Into<String>, last_backup: Option<String>) -> Self {
        let name = name.into();
        StorageUnit {
            kind: UnitKind::from_logical_name(&name),
            name,
            file_path: file_path.into(),
            last_backup,
        }
    }

    /// File name inside a backup directory.
    pub fn file_name(&self) -> String {
        file_name_of(&self.file_path)
    }
}

/// Last path component of an engine-reported file path.
pub fn file_name_of(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// Where a unit lives on the live system: the recorded path when it names a
/// directory, otherwise the database's data directory.
pub fn live_location(recorded: &str, data_dir: &Path) -> PathBuf {
    let path = Path::new(recorded);
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => path.to_path_buf(),
        _ => data_dir.join(file_name_of(recorded)),
    }
}
