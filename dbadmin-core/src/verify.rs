//! Structural verification of a single data file.

use crate::process::run_command;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerdictStatus {
    Ok,
    Warning,
    Error,
}

impl fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VerdictStatus::Ok => "OK",
            VerdictStatus::Warning => "WARNING",
            VerdictStatus::Error => "ERROR",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub status: VerdictStatus,
    pub diagnostic: Option<String>,
}

impl Verdict {
    pub fn ok() -> Self {
        Verdict {
            status: VerdictStatus::Ok,
            diagnostic: None,
        }
    }

    pub fn warning(diagnostic: impl Into<String>) -> Self {
        Verdict {
            status: VerdictStatus::Warning,
            diagnostic: Some(diagnostic.into()),
        }
    }

    pub fn error(diagnostic: impl Into<String>) -> Self {
        Verdict {
            status: VerdictStatus::Error,
            diagnostic: Some(diagnostic.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == VerdictStatus::Ok
    }

    pub fn diagnostic_text(&self) -> &str {
        self.diagnostic.as_deref().unwrap_or("")
    }
}

/// Checks one data file against the system catalog it belongs to.
pub trait IntegrityVerifier: Send + Sync {
    fn verify(&self, data_file: &Path, catalog_file: &Path) -> Verdict;
}

/// Runs an external checker invoked as
/// `<program> <data_file> <report_file> <catalog_file>`.
#[derive(Debug, Clone)]
pub struct CommandVerifier {
    program: PathBuf,
    timeout: Duration,
}

impl CommandVerifier {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

impl IntegrityVerifier for CommandVerifier {
    fn verify(&self, data_file: &Path, catalog_file: &Path) -> Verdict {
        // Removed when it goes out of scope, on every path out of this function.
        let report = match tempfile::NamedTempFile::new() {
            Ok(f) => f,
            Err(e) => return Verdict::error(format!("could not create report file: {}", e)),
        };

        let mut cmd = Command::new(&self.program);
        cmd.arg(data_file).arg(report.path()).arg(catalog_file);

        let output = match run_command(cmd, None, self.timeout) {
            Ok(output) => output,
            Err(e) => {
                warn!(file = %data_file.display(), "Checker could not run: {}", e);
                return Verdict::error(format!("could not run {}: {}", self.program.display(), e));
            }
        };

        debug!(file = %data_file.display(), code = ?output.code, "Checked data file");
        if output.success() {
            return Verdict::ok();
        }

        let mut diagnostic = std::fs::read_to_string(report.path()).unwrap_or_default();
        if diagnostic.trim().is_empty() {
            diagnostic = output.message();
        }

        match output.code {
            Some(1) => Verdict::warning(diagnostic),
            _ => Verdict::error(diagnostic),
        }
    }
}
