//! Bounded execution of external programs.
//!
//! Every engine tool the core drives goes through [`run_command`], which
//! captures stdout/stderr on reader threads and kills the child once the
//! timeout expires.

use crate::utils::errors::{AdminError, Result};
use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const ETXTBSY: i32 = 26;

/// Captured result of a finished program.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn exit_code(&self) -> i64 {
        self.code.map(i64::from).unwrap_or(-1)
    }

    /// Stdout with line breaks removed, the way single-line tool output is read.
    pub fn stdout_line(&self) -> String {
        self.stdout.replace('\n', "")
    }

    /// Whatever the program said, preferring stdout.
    pub fn message(&self) -> String {
        let out = self.stdout.trim();
        if out.is_empty() {
            self.stderr.trim().to_string()
        } else {
            out.to_string()
        }
    }
}

/// Runs `command` to completion, feeding `stdin` if given.
///
/// Launch failures are [`AdminError::Control`]; an expired timeout kills the
/// child and yields [`AdminError::Timeout`].
pub fn run_command(mut command: Command, stdin: Option<&str>, timeout: Duration) -> Result<CommandOutput> {
    let program = command.get_program().to_string_lossy().into_owned();

    command
        .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = spawn_retrying(&mut command).map_err(|e| AdminError::Control {
        code: e.raw_os_error().map(i64::from).unwrap_or(-1),
        message: format!("failed to run {}: {}", program, e),
    })?;

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        let input = input.to_string();
        thread::spawn(move || {
            // Closing the pipe on drop signals end of input.
            let _ = pipe.write_all(input.as_bytes());
        });
    }

    let stdout = spawn_reader(child.stdout.take());
    let stderr = spawn_reader(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            warn!(program = %program, "Killing program after {}s", timeout.as_secs());
            let _ = child.kill();
            let _ = child.wait();
            return Err(AdminError::Timeout {
                program,
                after: timeout,
            });
        }
        thread::sleep(POLL_INTERVAL);
    };

    let output = CommandOutput {
        code: status.code(),
        stdout: join_reader(stdout),
        stderr: join_reader(stderr),
    };
    debug!(program = %program, code = ?output.code, "Program finished");
    Ok(output)
}

/// Spawns, retrying briefly while the executable is still open for writing
/// elsewhere (ETXTBSY right after a tool was installed).
pub(crate) fn spawn_retrying(command: &mut Command) -> std::io::Result<Child> {
    let mut attempts = 0;
    loop {
        match command.spawn() {
            Err(e) if e.raw_os_error() == Some(ETXTBSY) && attempts < 10 => {
                attempts += 1;
                thread::sleep(Duration::from_millis(50));
            }
            result => return result,
        }
    }
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn join_reader(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn test_captures_output_and_code() {
        let out = run_command(sh("echo out; echo err >&2; exit 3"), None, Duration::from_secs(10)).unwrap();
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
        assert!(!out.success());
        assert_eq!(out.exit_code(), 3);
    }

    #[test]
    fn test_feeds_stdin() {
        let out = run_command(sh("read line; echo got:$line"), Some("Y\n"), Duration::from_secs(10)).unwrap();
        assert!(out.success());
        assert_eq!(out.stdout_line(), "got:Y");
    }

    #[test]
    fn test_timeout_kills_child() {
        let started = Instant::now();
        let err = run_command(sh("sleep 30"), None, Duration::from_millis(200)).unwrap_err();
        assert!(matches!(err, AdminError::Timeout { .. }));
        assert_eq!(err.error_code(), -11);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_missing_program_is_control_error() {
        let err = run_command(
            Command::new("/nonexistent/program-12345"),
            None,
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(matches!(err, AdminError::Control { .. }));
        assert!(err.to_string().contains("failed to run"));
    }

    #[test]
    fn test_message_prefers_stdout() {
        let out = CommandOutput {
            code: Some(1),
            stdout: "  \n".into(),
            stderr: "boom\n".into(),
        };
        assert_eq!(out.message(), "boom");
    }
}
