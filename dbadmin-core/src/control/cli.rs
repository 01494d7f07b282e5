//! [`DatabaseControl`] over the engine's command line tools.

use super::{DatabaseControl, ServerStatus};
use crate::config::ToolConfig;
use crate::process::{run_command, CommandOutput};
use crate::session::Credentials;
use crate::utils::errors::{AdminError, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
pub struct CliControl {
    control_program: PathBuf,
    path_program: PathBuf,
    sql_shell: PathBuf,
    change_value_program: PathBuf,
    timeout: Duration,
}

impl CliControl {
    pub fn new(config: &ToolConfig) -> Self {
        Self {
            control_program: config.control_program.clone(),
            path_program: config.path_program.clone(),
            sql_shell: config.sql_shell.clone(),
            change_value_program: config.change_value_program.clone(),
            timeout: config.command_timeout(),
        }
    }

    fn control(&self, flag: &str, database: &str) -> Result<CommandOutput> {
        let mut cmd = Command::new(&self.control_program);
        cmd.arg(flag).arg(database);
        run_command(cmd, None, self.timeout)
    }

    /// Runs a lifecycle command that only reports success or failure.
    fn control_ok(&self, flag: &str, database: &str) -> Result<()> {
        let output = self.control(flag, database)?;
        if output.success() {
            Ok(())
        } else {
            Err(AdminError::Control {
                code: output.exit_code(),
                message: output.stdout_line(),
            })
        }
    }
}

impl DatabaseControl for CliControl {
    fn status(&self, database: &str) -> Result<ServerStatus> {
        let output = self.control("-bc", database)?;
        if !output.success() {
            return Err(AdminError::Control {
                code: output.exit_code(),
                message: output.stdout_line(),
            });
        }
        Ok(ServerStatus::parse(&output.stdout_line()))
    }

    fn stop(&self, database: &str, force: bool) -> Result<()> {
        info!(database = %database, force, "Stopping database");
        self.control_ok(if force { "-k" } else { "-t" }, database)
    }

    fn start(&self, database: &str) -> Result<()> {
        info!(database = %database, "Starting database");
        self.control_ok("-s", database)
    }

    fn data_directory(&self, database: &str) -> Result<PathBuf> {
        let mut cmd = Command::new(&self.path_program);
        cmd.arg(database);
        let output = run_command(cmd, None, self.timeout)?;
        let line = output.stdout_line();
        let first = line.split(':').next().unwrap_or("").trim();
        if !output.success() || first.is_empty() {
            return Err(AdminError::Control {
                code: output.exit_code(),
                message: format!("no data directory reported for {}", database),
            });
        }
        Ok(PathBuf::from(first))
    }

    fn replay_catalog_log(&self, database: &str, credentials: &Credentials) -> Result<CommandOutput> {
        info!(database = %database, "Replaying recovery log onto the system catalog");
        let mut cmd = Command::new(&self.sql_shell);
        cmd.arg("-s")
            .arg(format!("-u{}", credentials.user))
            .arg(format!("-p{}", credentials.password))
            .arg(database);
        // Single-user mode asks for confirmation before applying the log.
        run_command(cmd, Some("Y\n"), self.timeout)
    }

    fn set_config_value(&self, config_file: &Path, name: &str, value: &str) -> Result<()> {
        let mut cmd = Command::new(&self.change_value_program);
        cmd.arg(config_file).arg(name).arg(value);
        let output = run_command(cmd, None, self.timeout)?;
        if output.success() {
            info!(file = %config_file.display(), parameter = %name, value = %value, "Parameter set");
            Ok(())
        } else {
            Err(AdminError::Control {
                code: output.exit_code(),
                message: output.message(),
            })
        }
    }
}
