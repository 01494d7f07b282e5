//! Sessions driven through the engine's interactive SQL shell.
//!
//! The shell runs as a child process for the lifetime of the session.
//! Every statement is followed by a sentinel query selecting a unique
//! marker; everything printed before the marker comes back is the
//! statement's output.

use super::errors::{ErrorClassifier, RawDriverError};
use super::{statements, Credentials, DatabaseSession, Query, SessionFactory, ROW_TAG};
use crate::process::spawn_retrying;
use crate::units::StorageUnit;
use crate::utils::errors::{AdminError, Result, LOGIN_FAILURE_CODE};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const CLOSE_GRACE: Duration = Duration::from_secs(2);

pub struct ShellSessionFactory {
    shell: PathBuf,
    statement_timeout: Duration,
    classifier: Arc<dyn ErrorClassifier>,
}

impl ShellSessionFactory {
    pub fn new(shell: impl Into<PathBuf>, statement_timeout: Duration, classifier: Arc<dyn ErrorClassifier>) -> Self {
        Self {
            shell: shell.into(),
            statement_timeout,
            classifier,
        }
    }
}

impl SessionFactory for ShellSessionFactory {
    fn connect(&self, database: &str, credentials: &Credentials) -> Result<Box<dyn DatabaseSession>> {
        let session = ShellSession::open(
            &self.shell,
            database,
            credentials,
            self.statement_timeout,
            self.classifier.clone(),
        )?;
        Ok(Box::new(session))
    }
}

pub struct ShellSession {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    lines: Receiver<String>,
    timeout: Duration,
    classifier: Arc<dyn ErrorClassifier>,
}

impl ShellSession {
    fn open(
        shell: &PathBuf,
        database: &str,
        credentials: &Credentials,
        timeout: Duration,
        classifier: Arc<dyn ErrorClassifier>,
    ) -> Result<Self> {
        let mut command = Command::new(shell);
        command
            .arg(format!("-u{}", credentials.user))
            .arg(format!("-p{}", credentials.password))
            .arg(database)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = spawn_retrying(&mut command)
            .map_err(|e| AdminError::Control {
                code: e.raw_os_error().map(i64::from).unwrap_or(-1),
                message: format!("failed to run {}: {}", shell.display(), e),
            })?;

        let (tx, rx) = mpsc::channel();
        if let Some(out) = child.stdout.take() {
            forward_lines(out, tx.clone());
        }
        if let Some(err) = child.stderr.take() {
            forward_lines(err, tx);
        }

        let mut session = ShellSession {
            stdin: child.stdin.take(),
            child: Some(child),
            lines: rx,
            timeout,
            classifier,
        };

        // The shell reports a rejected login before the first marker.
        session.round_trip(None)?;
        debug!(database = %database, user = %credentials.user, "Shell session opened");
        Ok(session)
    }

    /// Sends `statement` (if any) plus the sentinel and collects the output.
    fn round_trip(&mut self, statement: Option<&str>) -> Result<Vec<String>> {
        let marker = format!("END-{}", uuid::Uuid::new_v4().simple());
        let mut script = String::new();
        if let Some(sql) = statement {
            script.push_str(sql.trim_end_matches(';'));
            script.push_str(";\n");
        }
        script.push_str(&format!("SELECT '{}' FROM system.onerow;\n", marker));

        let stdin = self.stdin.as_mut().ok_or_else(|| AdminError::Database {
            code: -1,
            message: "session is closed".into(),
        })?;
        if let Err(e) = stdin.write_all(script.as_bytes()).and_then(|_| stdin.flush()) {
            // The shell has gone away; whatever it printed explains why.
            let output = self.drain();
            return Err(self.failure(&output, Some(e.to_string())));
        }

        let quoted = format!("'{}'", marker);
        let deadline = Instant::now() + self.timeout;
        let mut output = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.lines.recv_timeout(remaining) {
                Ok(line) if line.contains(&marker) && !line.contains(&quoted) => break,
                Ok(line) => output.push(line),
                Err(RecvTimeoutError::Timeout) => {
                    self.kill();
                    return Err(AdminError::Timeout {
                        program: "sql shell".into(),
                        after: self.timeout,
                    });
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(self.failure(&output, Some("shell exited".into())));
                }
            }
        }

        match parse_error(&output) {
            Some(raw) => Err(self.classifier.classify(&raw)),
            None => Ok(output),
        }
    }

    fn failure(&self, output: &[String], fallback: Option<String>) -> AdminError {
        let raw = parse_error(output).unwrap_or_else(|| {
            let text = output.join(" ").trim().to_string();
            let text = if text.is_empty() { fallback.unwrap_or_default() } else { text };
            if text.to_ascii_lowercase().contains("login") {
                RawDriverError::new(Some(LOGIN_FAILURE_CODE), text)
            } else {
                RawDriverError::new(None, text)
            }
        });
        self.classifier.classify(&raw)
    }

    fn drain(&self) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(line) = self.lines.recv_timeout(Duration::from_millis(200)) {
            out.push(line);
        }
        out
    }

    fn kill(&mut self) {
        self.stdin.take();
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl DatabaseSession for ShellSession {
    fn execute(&mut self, sql: &str) -> Result<()> {
        debug!(statement = %sql, "Executing statement");
        self.round_trip(Some(sql)).map(|_| ())
    }

    fn query(&mut self, query: &Query) -> Result<Vec<Vec<String>>> {
        let output = self.round_trip(Some(&query.render()))?;
        Ok(output.iter().filter_map(|line| query.parse_row(line)).collect())
    }

    fn storage_units(&mut self) -> Result<Vec<StorageUnit>> {
        let rows = self.query(&statements::unit_query())?;
        Ok(rows.into_iter().filter_map(unit_from_row).collect())
    }

    fn close(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        if let Some(mut stdin) = self.stdin.take() {
            let _ = stdin.write_all(b"exit;\n");
        }
        let deadline = Instant::now() + CLOSE_GRACE;
        loop {
            match child.try_wait() {
                Ok(Some(_)) => break,
                Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(20)),
                _ => {
                    warn!("SQL shell did not exit, killing it");
                    let _ = child.kill();
                    let _ = child.wait();
                    break;
                }
            }
        }
    }
}

impl Drop for ShellSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn forward_lines<R: Read + Send + 'static>(pipe: R, tx: Sender<String>) {
    thread::spawn(move || {
        for line in BufReader::new(pipe).lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
}

/// Whether `line` is the engine's error banner, `[Mimer SQL] error <code>`.
fn is_error_banner(line: &str) -> bool {
    let line = line.trim_start();
    if line.starts_with(ROW_TAG) {
        return false;
    }
    let lower = line.to_ascii_lowercase();
    let rest = lower.strip_prefix("mimer sql ").unwrap_or(&lower);
    let Some(rest) = rest.strip_prefix("error") else {
        return false;
    };
    if !rest.starts_with(char::is_whitespace) {
        return false;
    }
    let code = rest.trim_start();
    let digits = code.strip_prefix('-').unwrap_or(code);
    digits.starts_with(|c: char| c.is_ascii_digit())
}

/// First error reported in shell output: the code follows the word
/// "error" in the banner, the message runs from the banner to the end.
fn parse_error(output: &[String]) -> Option<RawDriverError> {
    let start = output.iter().position(|line| is_error_banner(line))?;
    let code = output[start]
        .split_whitespace()
        .skip_while(|t| !t.eq_ignore_ascii_case("error"))
        .nth(1)
        .and_then(|t| t.trim_end_matches(|c: char| !c.is_ascii_digit()).parse::<i64>().ok());
    let message = output[start..]
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    Some(RawDriverError::new(code, message))
}

/// `[name, file, last_backup]` as selected by the unit query.
fn unit_from_row(row: Vec<String>) -> Option<StorageUnit> {
    let [name, file, last_backup]: [String; 3] = row.try_into().ok()?;
    if name.is_empty() || name.contains(|c: char| c.is_whitespace() || c == '\'') {
        return None;
    }
    let last_backup = Some(last_backup).filter(|s| !s.is_empty());
    Some(StorageUnit::new(name, file, last_backup))
}
