//! Server lifecycle: status, stop, start, catalog log replay and parameter changes.

pub mod cli;
pub mod parameters;

use crate::process::CommandOutput;
use crate::session::Credentials;
use crate::utils::errors::Result;
use serde::{Serialize, Serializer};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerState {
    Running,
    Stopped,
    /// Anything the lifecycle program reports that is neither.
    Other(String),
}

impl ServerState {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "running" => ServerState::Running,
            "stopped" | "not running" | "not started" => ServerState::Stopped,
            _ => ServerState::Other(raw.trim().to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            ServerState::Running => "Running",
            ServerState::Stopped => "Stopped",
            ServerState::Other(s) => s,
        }
    }
}

impl Serialize for ServerState {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerStatus {
    #[serde(rename = "state")]
    pub status: ServerState,
    pub login: String,
    pub database_path: String,
    pub connected_users: u32,
    pub start_time: Option<String>,
    pub bufferpool_size: u64,
}

impl ServerStatus {
    /// Parses the comma-separated status line:
    /// `state,login,path,users,_,start_time,bufferpool`. Only a running
    /// server reports the trailing fields.
    pub fn parse(line: &str) -> Self {
        let fields: Vec<&str> = line.trim().split(',').map(str::trim).collect();
        let field = |i: usize| fields.get(i).copied().unwrap_or("");
        let status = ServerState::parse(field(0));
        let running = status == ServerState::Running;
        ServerStatus {
            login: field(1).to_string(),
            database_path: field(2).to_string(),
            connected_users: if running { field(3).parse().unwrap_or(0) } else { 0 },
            start_time: Some(field(5))
                .filter(|s| running && !s.is_empty())
                .map(str::to_string),
            bufferpool_size: if running { field(6).parse().unwrap_or(0) } else { 0 },
            status,
        }
    }
}

/// Controls a database server process.
pub trait DatabaseControl: Send + Sync {
    fn status(&self, database: &str) -> Result<ServerStatus>;

    /// Graceful stop, or a kill when `force` is set.
    fn stop(&self, database: &str, force: bool) -> Result<()>;

    fn start(&self, database: &str) -> Result<()>;

    /// Directory holding the database's data files.
    fn data_directory(&self, database: &str) -> Result<PathBuf>;

    /// Asks the stopped engine to roll the system catalog forward from the
    /// recovery log. Returns the raw output; judging it is up to the caller.
    fn replay_catalog_log(&self, database: &str, credentials: &Credentials) -> Result<CommandOutput>;

    /// Sets one server parameter in `config_file` through the engine's
    /// change-value tool.
    fn set_config_value(&self, config_file: &Path, name: &str, value: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_running_status() {
        let status = ServerStatus::parse("Running,Enabled,/data/db,3,x,2024-01-01 10:00:00,2000\n");
        assert_eq!(status.status, ServerState::Running);
        assert_eq!(status.login, "Enabled");
        assert_eq!(status.database_path, "/data/db");
        assert_eq!(status.connected_users, 3);
        assert_eq!(status.start_time.as_deref(), Some("2024-01-01 10:00:00"));
        assert_eq!(status.bufferpool_size, 2000);
    }

    #[test]
    fn test_parse_stopped_status() {
        let status = ServerStatus::parse("Stopped,Disabled,/data/db");
        assert_eq!(status.status, ServerState::Stopped);
        assert_eq!(status.connected_users, 0);
        assert!(status.start_time.is_none());
    }

    #[test]
    fn test_parse_other_state() {
        let status = ServerStatus::parse("Starting,Disabled,/data/db");
        assert_eq!(status.status, ServerState::Other("Starting".into()));
        assert_eq!(status.status.label(), "Starting");
    }

    #[test]
    fn test_status_serializes_state_label() {
        let status = ServerStatus::parse("Not running,Disabled,/data/db");
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["state"], "Stopped");
        assert_eq!(value["database_path"], "/data/db");
    }
}
