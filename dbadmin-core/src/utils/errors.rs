//! Error types shared by every operation in the core.
//!
//! Each variant maps to one failure domain so callers can tell a filesystem
//! problem from an engine problem without parsing text.

use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Engine code reported when a login is rejected.
pub const LOGIN_FAILURE_CODE: i64 = 90;

/// Code reported when a required request parameter is missing.
pub const MISSING_PARAMETER_CODE: i64 = 12872;

/// Negative sentinel codes owned by this crate. Engine codes are never
/// remapped onto these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentinel {
    NotFound,
    VerificationFailed,
    StopStartFailed,
    UnknownState,
    StatusUnavailable,
    DataDirUnknown,
    LogReplayFailed,
    NoLogToApply,
    IncompleteBackup,
    StaleBackupId,
    Timeout,
    EmptyCatalog,
    InvalidLocation,
}

impl Sentinel {
    pub fn code(self) -> i64 {
        match self {
            Sentinel::NotFound => -1,
            Sentinel::VerificationFailed => -2,
            Sentinel::StopStartFailed => -3,
            Sentinel::UnknownState => -4,
            Sentinel::StatusUnavailable => -5,
            Sentinel::DataDirUnknown => -6,
            Sentinel::LogReplayFailed => -7,
            Sentinel::NoLogToApply => -8,
            Sentinel::IncompleteBackup => -9,
            Sentinel::StaleBackupId => -10,
            Sentinel::Timeout => -11,
            Sentinel::EmptyCatalog => -12,
            Sentinel::InvalidLocation => -13,
        }
    }
}

#[derive(Error, Debug)]
pub enum AdminError {
    #[error("Invalid parameters: Missing parameter '{0}'")]
    MissingParameter(&'static str),

    #[error("Invalid parameters: {0}")]
    InvalidParameter(String),

    #[error("{message}")]
    Filesystem { code: i64, message: String },

    #[error("{message}")]
    Database { code: i64, message: String },

    #[error("Verification of {unit} failed: {diagnostic}")]
    Verification { unit: String, diagnostic: String },

    #[error("{message}")]
    Sequence { sentinel: Sentinel, message: String },

    #[error("{message}")]
    Control { code: i64, message: String },

    #[error("{program} did not finish within {}s", .after.as_secs())]
    Timeout { program: String, after: Duration },
}

impl AdminError {
    pub fn sequence(sentinel: Sentinel, message: impl Into<String>) -> Self {
        AdminError::Sequence {
            sentinel,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::sequence(Sentinel::NotFound, message)
    }

    /// Wraps an OS error, naming the path it happened on.
    pub fn io_at(path: &Path, err: std::io::Error) -> Self {
        AdminError::Filesystem {
            code: err.raw_os_error().map(i64::from).unwrap_or(-1),
            message: format!("{}: {}", path.display(), err),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AdminError::Sequence {
                sentinel: Sentinel::NotFound,
                ..
            }
        )
    }

    /// Numeric code carried in failure documents.
    pub fn error_code(&self) -> i64 {
        match self {
            AdminError::MissingParameter(_) | AdminError::InvalidParameter(_) => MISSING_PARAMETER_CODE,
            AdminError::Filesystem { code, .. } => *code,
            AdminError::Database { code, .. } => *code,
            AdminError::Verification { .. } => Sentinel::VerificationFailed.code(),
            AdminError::Sequence { sentinel, .. } => sentinel.code(),
            AdminError::Control { code, .. } => *code,
            AdminError::Timeout { .. } => Sentinel::Timeout.code(),
        }
    }
}

impl From<std::io::Error> for AdminError {
    fn from(err: std::io::Error) -> Self {
        AdminError::Filesystem {
            code: err.raw_os_error().map(i64::from).unwrap_or(-1),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AdminError>;

/// Rejects a missing or blank required parameter before any side effect.
pub fn require<'a>(name: &'static str, value: Option<&'a str>) -> Result<&'a str> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(AdminError::MissingParameter(name)),
    }
}
