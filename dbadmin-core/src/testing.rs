//! In-process stand-ins for the engine, its lifecycle tools and the checker.

use crate::control::{DatabaseControl, ServerState, ServerStatus};
use crate::process::CommandOutput;
use crate::session::{Credentials, DatabaseSession, Query, SessionFactory};
use crate::units::StorageUnit;
use crate::utils::errors::{AdminError, Result, LOGIN_FAILURE_CODE};
use crate::verify::{IntegrityVerifier, Verdict};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Writes an executable `sh` script into `dir`.
#[cfg(unix)]
pub(crate) fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    {
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "#!/bin/sh").unwrap();
        writeln!(file, "{}", body).unwrap();
        file.sync_all().unwrap();
    }
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// A data file whose content names the unit, enough for the fakes to tell
/// copies apart.
pub(crate) fn write_unit_file(path: &Path, content: &str) {
    fs::write(path, content).unwrap();
}

#[derive(Default)]
struct EngineState {
    units: Vec<StorageUnit>,
    executed: Vec<String>,
    failures: Vec<(String, i64)>,
    rows: Vec<(String, Vec<Vec<String>>)>,
    refuse_login: bool,
    opened: usize,
    closed: usize,
}

/// Shared engine state behind every [`FakeSession`] it hands out.
#[derive(Clone, Default)]
pub(crate) struct FakeEngine {
    state: Arc<Mutex<EngineState>>,
}

impl FakeEngine {
    pub fn new(units: Vec<StorageUnit>) -> Self {
        let engine = FakeEngine::default();
        engine.state.lock().unwrap().units = units;
        engine
    }

    /// Statements containing `fragment` fail with engine code `code`.
    pub fn fail_on(&self, fragment: &str, code: i64) {
        self.state.lock().unwrap().failures.push((fragment.to_string(), code));
    }

    /// Queries whose text contains `fragment` return `rows`; the first
    /// registered match wins and anything unmatched returns no rows.
    pub fn set_rows(&self, fragment: &str, rows: &[&[&str]]) {
        let rows = rows
            .iter()
            .map(|row| row.iter().map(|v| v.to_string()).collect())
            .collect();
        self.state.lock().unwrap().rows.push((fragment.to_string(), rows));
    }

    pub fn refuse_login(&self) {
        self.state.lock().unwrap().refuse_login = true;
    }

    pub fn executed(&self) -> Vec<String> {
        self.state.lock().unwrap().executed.clone()
    }

    pub fn opened_sessions(&self) -> usize {
        self.state.lock().unwrap().opened
    }

    pub fn closed_sessions(&self) -> usize {
        self.state.lock().unwrap().closed
    }

    fn execute(&self, sql: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.executed.push(sql.to_string());
        if let Some((_, code)) = state.failures.iter().find(|(f, _)| sql.contains(f.as_str())) {
            return Err(AdminError::Database {
                code: *code,
                message: format!("statement failed: {}", sql),
            });
        }
        if let Some((target, unit)) = parse_backup_statement(sql) {
            fs::write(&target, format!("copy of {}", unit))?;
        }
        Ok(())
    }

    fn query(&self, query: &Query) -> Result<Vec<Vec<String>>> {
        let sql = query.render();
        self.execute(&sql)?;
        let state = self.state.lock().unwrap();
        Ok(state
            .rows
            .iter()
            .find(|(f, _)| sql.contains(f.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }
}

/// `create backup in '<path>' for databank <name>` → (path, name).
fn parse_backup_statement(sql: &str) -> Option<(PathBuf, String)> {
    let rest = sql.strip_prefix("create backup in '")?;
    let (path, unit) = rest.rsplit_once("' for databank ")?;
    Some((PathBuf::from(path.replace("''", "'")), unit.to_string()))
}

pub(crate) struct FakeSession {
    engine: FakeEngine,
    closed: bool,
}

impl DatabaseSession for FakeSession {
    fn execute(&mut self, sql: &str) -> Result<()> {
        self.engine.execute(sql)
    }

    fn query(&mut self, query: &Query) -> Result<Vec<Vec<String>>> {
        self.engine.query(query)
    }

    fn storage_units(&mut self) -> Result<Vec<StorageUnit>> {
        Ok(self.engine.state.lock().unwrap().units.clone())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.engine.state.lock().unwrap().closed += 1;
        }
    }
}

pub(crate) struct FakeSessionFactory {
    engine: FakeEngine,
}

impl FakeSessionFactory {
    pub fn new(engine: FakeEngine) -> Self {
        Self { engine }
    }
}

impl SessionFactory for FakeSessionFactory {
    fn connect(&self, _database: &str, _credentials: &Credentials) -> Result<Box<dyn DatabaseSession>> {
        let mut state = self.engine.state.lock().unwrap();
        if state.refuse_login {
            return Err(AdminError::Database {
                code: LOGIN_FAILURE_CODE,
                message: "Login failure".into(),
            });
        }
        state.opened += 1;
        Ok(Box::new(FakeSession {
            engine: self.engine.clone(),
            closed: false,
        }))
    }
}

struct ControlState {
    server: ServerState,
    status_fails: bool,
    graceful_stop_fails: bool,
    forced_stop_fails: bool,
    start_fails: bool,
    data_dir: Option<PathBuf>,
    replay_output: CommandOutput,
    rejected_parameters: Vec<String>,
    changed_parameters: Vec<(PathBuf, String, String)>,
    calls: Vec<String>,
}

/// Scripted lifecycle controller that records every call.
pub(crate) struct FakeControl {
    state: Mutex<ControlState>,
}

impl FakeControl {
    pub fn new(server: ServerState, data_dir: &Path) -> Self {
        FakeControl {
            state: Mutex::new(ControlState {
                server,
                status_fails: false,
                graceful_stop_fails: false,
                forced_stop_fails: false,
                start_fails: false,
                data_dir: Some(data_dir.to_path_buf()),
                replay_output: CommandOutput {
                    code: Some(0),
                    stdout: "SQL>Y SQL&\nDatabank SYSDB has been restored from log\nSQL>\n".into(),
                    stderr: String::new(),
                },
                rejected_parameters: Vec::new(),
                changed_parameters: Vec::new(),
                calls: Vec::new(),
            }),
        }
    }

    pub fn fail_status(&self) {
        self.state.lock().unwrap().status_fails = true;
    }

    pub fn fail_graceful_stop(&self) {
        self.state.lock().unwrap().graceful_stop_fails = true;
    }

    pub fn fail_forced_stop(&self) {
        self.state.lock().unwrap().forced_stop_fails = true;
    }

    pub fn fail_start(&self) {
        self.state.lock().unwrap().start_fails = true;
    }

    pub fn forget_data_dir(&self) {
        self.state.lock().unwrap().data_dir = None;
    }

    pub fn set_replay_output(&self, code: i32, stdout: &str) {
        self.state.lock().unwrap().replay_output = CommandOutput {
            code: Some(code),
            stdout: stdout.to_string(),
            stderr: String::new(),
        };
    }

    /// Changes to `name` fail as the change-value tool would.
    pub fn reject_parameter(&self, name: &str) {
        self.state.lock().unwrap().rejected_parameters.push(name.to_string());
    }

    /// Every (parameter file, name, value) accepted so far.
    pub fn changed_parameters(&self) -> Vec<(PathBuf, String, String)> {
        self.state.lock().unwrap().changed_parameters.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn server_state(&self) -> ServerState {
        self.state.lock().unwrap().server.clone()
    }
}

impl DatabaseControl for FakeControl {
    fn status(&self, database: &str) -> Result<ServerStatus> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("status".into());
        if state.status_fails {
            return Err(AdminError::Control {
                code: 1,
                message: format!("no status for {}", database),
            });
        }
        Ok(ServerStatus {
            status: state.server.clone(),
            login: "Enabled".into(),
            database_path: String::new(),
            connected_users: 0,
            start_time: None,
            bufferpool_size: 0,
        })
    }

    fn stop(&self, _database: &str, force: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(if force { "kill" } else { "stop" }.into());
        let fails = if force { state.forced_stop_fails } else { state.graceful_stop_fails };
        if fails {
            return Err(AdminError::Control {
                code: if force { 3 } else { 2 },
                message: "Server did not stop".into(),
            });
        }
        state.server = ServerState::Stopped;
        Ok(())
    }

    fn start(&self, _database: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("start".into());
        if state.start_fails {
            return Err(AdminError::Control {
                code: 4,
                message: "License expired".into(),
            });
        }
        state.server = ServerState::Running;
        Ok(())
    }

    fn data_directory(&self, database: &str) -> Result<PathBuf> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("data_directory".into());
        state.data_dir.clone().ok_or_else(|| AdminError::Control {
            code: 1,
            message: format!("no data directory for {}", database),
        })
    }

    fn replay_catalog_log(&self, _database: &str, _credentials: &Credentials) -> Result<CommandOutput> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("replay".into());
        Ok(state.replay_output.clone())
    }

    fn set_config_value(&self, config_file: &Path, name: &str, value: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("set_config".into());
        if state.rejected_parameters.iter().any(|p| p == name) {
            return Err(AdminError::Control {
                code: 6,
                message: format!("Illegal value {} for {}", value, name),
            });
        }
        state
            .changed_parameters
            .push((config_file.to_path_buf(), name.to_string(), value.to_string()));
        Ok(())
    }
}

/// Verdicts by data file path; OK for anything not scripted that exists.
#[derive(Default)]
pub(crate) struct FakeVerifier {
    verdicts: Mutex<HashMap<PathBuf, Verdict>>,
    checked: Mutex<Vec<(PathBuf, PathBuf)>>,
}

impl FakeVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, data_file: &Path, verdict: Verdict) {
        self.verdicts.lock().unwrap().insert(data_file.to_path_buf(), verdict);
    }

    /// Every (data file, catalog file) pair checked so far.
    pub fn checked(&self) -> Vec<(PathBuf, PathBuf)> {
        self.checked.lock().unwrap().clone()
    }
}

impl IntegrityVerifier for FakeVerifier {
    fn verify(&self, data_file: &Path, catalog_file: &Path) -> Verdict {
        self.checked
            .lock()
            .unwrap()
            .push((data_file.to_path_buf(), catalog_file.to_path_buf()));
        if let Some(verdict) = self.verdicts.lock().unwrap().get(data_file) {
            return verdict.clone();
        }
        if data_file.is_file() {
            Verdict::ok()
        } else {
            Verdict::error(format!("{} does not exist", data_file.display()))
        }
    }
}
