//! Configuration of the external programs the core drives.
//!
//! Loaded as the `[tools]` section of the server's TOML file; every field has
//! a default so an empty section is valid.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// How engine errors are decoded. Chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorDialect {
    /// The driver reports a numeric code next to the message.
    Structured,
    /// The driver reports only text; the code is the trailing token.
    Legacy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Lifecycle program: status, start, stop and kill.
    #[serde(default = "default_control_program")]
    pub control_program: PathBuf,

    /// Program printing the database's data directories, colon separated.
    #[serde(default = "default_path_program")]
    pub path_program: PathBuf,

    /// Interactive SQL shell used for sessions and catalog log replay.
    #[serde(default = "default_sql_shell")]
    pub sql_shell: PathBuf,

    /// Sets one parameter: `<program> <multidefs_file> <name> <value>`.
    #[serde(default = "default_change_value_program")]
    pub change_value_program: PathBuf,

    /// Structural checker: `<checker> <data_file> <report_file> <catalog_file>`.
    #[serde(default = "default_checker_program")]
    pub checker_program: PathBuf,

    /// Timeout for lifecycle and shell commands, in seconds.
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,

    /// Timeout for one structural check, in seconds. Large files take a while.
    #[serde(default = "default_verify_timeout_secs")]
    pub verify_timeout_secs: u64,

    /// Timeout for a single statement inside a session, in seconds.
    #[serde(default = "default_statement_timeout_secs")]
    pub statement_timeout_secs: u64,

    #[serde(default = "default_error_dialect")]
    pub error_dialect: ErrorDialect,
}

fn default_control_program() -> PathBuf {
    PathBuf::from("mimcontrol")
}

fn default_path_program() -> PathBuf {
    PathBuf::from("mimpath")
}

fn default_sql_shell() -> PathBuf {
    PathBuf::from("bsql")
}

fn default_change_value_program() -> PathBuf {
    PathBuf::from("mimchval")
}

fn default_checker_program() -> PathBuf {
    PathBuf::from("dbc")
}

fn default_command_timeout_secs() -> u64 {
    300
}

fn default_verify_timeout_secs() -> u64 {
    3600
}

fn default_statement_timeout_secs() -> u64 {
    3600
}

fn default_error_dialect() -> ErrorDialect {
    ErrorDialect::Structured
}

impl ToolConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify_timeout_secs)
    }

    pub fn statement_timeout(&self) -> Duration {
        Duration::from_secs(self.statement_timeout_secs)
    }
}

impl Default for ToolConfig {
    fn default() -> Self {
        ToolConfig {
            control_program: default_control_program(),
            path_program: default_path_program(),
            sql_shell: default_sql_shell(),
            change_value_program: default_change_value_program(),
            checker_program: default_checker_program(),
            command_timeout_secs: default_command_timeout_secs(),
            verify_timeout_secs: default_verify_timeout_secs(),
            statement_timeout_secs: default_statement_timeout_secs(),
            error_dialect: default_error_dialect(),
        }
    }
}
