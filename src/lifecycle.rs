//! Suite setup and teardown for server-backed suites.
//!
//! A request suite may declare a `server`: a program started as a child process before the
//! first case and stopped after the last. Coordination uses newline-delimited JSON:
//!
//! - child → runner on stdout: `{"type":"ready"}` once the server listens
//! - runner → child on stdin: `{"type":"stop","options":{"timeout":200}}`
//!
//! Any other stdout line is ignored.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::spec::{resolve_relative, type_name};
use crate::{err_msg, Done, JsonTestError};

/// Grace period, in milliseconds, the server is asked to honour when stopping.
pub const STOP_TIMEOUT_MS: u64 = 200;

/// Messages of the runner/server handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IpcMessage {
    Ready,
    Stop { options: StopOptions },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopOptions {
    pub timeout: u64,
}

impl IpcMessage {
    pub fn stop() -> Self {
        IpcMessage::Stop {
            options: StopOptions {
                timeout: STOP_TIMEOUT_MS,
            },
        }
    }
}

/// The `server` field of a suite document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// How long setup waits for `ready`; `None` waits indefinitely.
    pub ready_timeout: Option<Duration>,
}

impl ServerSpec {
    /// Accepts `"./server"` or `{"command": ..., "args": [...], "readyTimeout": ms}`.
    pub fn from_value(value: &Value, source_dir: &Path) -> Result<Self, JsonTestError> {
        match value {
            Value::String(command) => Ok(Self {
                program: resolve_program(command, source_dir),
                args: Vec::new(),
                ready_timeout: None,
            }),
            Value::Object(map) => {
                let Some(Value::String(command)) = map.get("command") else {
                    return Err(err_msg!(Configuration, "`server.command` must be a string"));
                };
                let args = match map.get("args") {
                    None | Some(Value::Null) => Vec::new(),
                    Some(Value::Array(items)) => items
                        .iter()
                        .map(|item| match item {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .collect(),
                    Some(other) => {
                        return Err(err_msg!(
                            Configuration,
                            "`server.args` must be an array, found {}",
                            type_name(other)
                        ))
                    }
                };
                let ready_timeout = match map.get("readyTimeout") {
                    None | Some(Value::Null) => None,
                    Some(v) => Some(Duration::from_millis(v.as_u64().ok_or_else(|| {
                        err_msg!(Configuration, "`server.readyTimeout` must be milliseconds")
                    })?)),
                };
                Ok(Self {
                    program: resolve_program(command, source_dir),
                    args,
                    ready_timeout,
                })
            }
            other => Err(err_msg!(
                Configuration,
                "`server` must be a path or an object, found {}",
                type_name(other)
            )),
        }
    }
}

/// Bare names go through `PATH`; anything with a separator is document-relative.
fn resolve_program(command: &str, source_dir: &Path) -> PathBuf {
    if command.contains('/') || command.contains(std::path::MAIN_SEPARATOR) {
        resolve_relative(source_dir, command)
    } else {
        PathBuf::from(command)
    }
}

struct ServerProcess {
    child: Child,
    stdin: Option<ChildStdin>,
}

impl ServerProcess {
    fn send(&mut self, message: &IpcMessage) -> Result<(), JsonTestError> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| err_msg!(Lifecycle, "server stdin is closed"))?;
        let mut line = serde_json::to_string(message)
            .map_err(|e| err_msg!(Lifecycle, "cannot encode {:?}: {}", message, e))?;
        line.push('\n');
        stdin.write_all(line.as_bytes())?;
        stdin.flush()?;
        Ok(())
    }
}

/// Per-suite setup/teardown state. Clones share the same child slot.
#[derive(Clone, Default)]
pub struct SuiteLifecycle {
    server: Option<ServerSpec>,
    process: Arc<Mutex<Option<ServerProcess>>>,
}

impl SuiteLifecycle {
    pub fn new(server: Option<ServerSpec>) -> Self {
        Self {
            server,
            process: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.process.lock().map(|p| p.is_some()).unwrap_or(false)
    }

    /// Starts the server, if any, and completes `done` once it reports `ready`.
    ///
    /// Without `readyTimeout` this blocks until the child signals or exits.
    pub fn set_up(&self, done: Done) {
        let Some(server) = self.server.clone() else {
            done.pass();
            return;
        };
        match self.start(&server) {
            Ok(()) => done.pass(),
            Err(e) => done.fail(e),
        }
    }

    /// Sends `stop` to a running server and forgets it without waiting for a reply.
    pub fn tear_down(&self) {
        let taken = match self.process.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(mut process) = taken else {
            return;
        };
        if let Err(e) = process.send(&IpcMessage::stop()) {
            tracing::warn!(error = %e, "failed to send stop to test server");
        } else {
            tracing::debug!(pid = process.child.id(), "stop sent to test server");
        }
        process.stdin = None;
        let mut child = process.child;
        // reap in the background so the child does not linger as a zombie
        thread::spawn(move || {
            let _ = child.wait();
        });
    }

    fn start(&self, server: &ServerSpec) -> Result<(), JsonTestError> {
        let mut child = Command::new(&server.program)
            .args(&server.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| JsonTestError::Lifecycle {
                message: format!("failed to start {}: {}", server.program.display(), e),
                source: Some(Box::new(e)),
            })?;
        let pid = child.id();
        tracing::debug!(pid, program = %server.program.display(), "test server spawned");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| err_msg!(Lifecycle, "server stdout is not captured"))?;
        let stdin = child.stdin.take();
        if let Ok(mut slot) = self.process.lock() {
            *slot = Some(ServerProcess { child, stdin });
        }

        let (ready_tx, ready_rx) = mpsc::channel();
        thread::spawn(move || {
            let mut ready_tx = Some(ready_tx);
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                match serde_json::from_str::<IpcMessage>(line.trim()) {
                    Ok(IpcMessage::Ready) => {
                        if let Some(tx) = ready_tx.take() {
                            let _ = tx.send(());
                        }
                    }
                    Ok(other) => tracing::trace!(pid, message = ?other, "ignored server message"),
                    Err(_) => tracing::trace!(pid, line = %line, "server output"),
                }
            }
        });

        let waited = match server.ready_timeout {
            Some(limit) => ready_rx.recv_timeout(limit),
            None => ready_rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        let failure = match waited {
            Ok(()) => {
                tracing::info!(pid, "test server ready");
                return Ok(());
            }
            Err(RecvTimeoutError::Timeout) => err_msg!(
                Lifecycle,
                "{} did not report ready within {} ms",
                server.program.display(),
                server.ready_timeout.map(|d| d.as_millis()).unwrap_or_default()
            ),
            Err(RecvTimeoutError::Disconnected) => err_msg!(
                Lifecycle,
                "{} exited before reporting ready",
                server.program.display()
            ),
        };
        self.kill();
        Err(failure)
    }

    /// Kills and reaps a server that never became ready.
    fn kill(&self) {
        let taken = match self.process.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(mut process) = taken else {
            return;
        };
        process.stdin = None;
        let pid = process.child.id();
        if let Err(e) = process.child.kill() {
            tracing::debug!(pid, error = %e, "test server already gone");
        }
        match process.child.wait() {
            Ok(status) => tracing::debug!(pid, %status, "test server killed"),
            Err(e) => tracing::warn!(pid, error = %e, "failed to reap test server"),
        }
    }
}

impl std::fmt::Debug for SuiteLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuiteLifecycle")
            .field("server", &self.server)
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_format_of_messages() {
        let stop = serde_json::to_value(IpcMessage::stop()).unwrap();
        assert_eq!(stop, json!({"type": "stop", "options": {"timeout": 200}}));
        let ready: IpcMessage = serde_json::from_str(r#"{"type":"ready"}"#).unwrap();
        assert_eq!(ready, IpcMessage::Ready);
    }

    #[test]
    fn server_spec_forms() {
        let dir = Path::new("/suites");
        let short = ServerSpec::from_value(&json!("./bin/server"), dir).unwrap();
        assert_eq!(short.program, PathBuf::from("/suites/bin/server"));
        assert_eq!(short.ready_timeout, None);

        let long = ServerSpec::from_value(
            &json!({"command": "sh", "args": ["-c", "true"], "readyTimeout": 500}),
            dir,
        )
        .unwrap();
        assert_eq!(long.program, PathBuf::from("sh"));
        assert_eq!(long.args, vec!["-c", "true"]);
        assert_eq!(long.ready_timeout, Some(Duration::from_millis(500)));

        assert!(ServerSpec::from_value(&json!(1), dir).is_err());
        assert!(ServerSpec::from_value(&json!({"args": []}), dir).is_err());
    }

    #[test]
    fn setup_without_server_completes_immediately() {
        let (done, rx) = Done::channel();
        SuiteLifecycle::new(None).set_up(done);
        assert!(rx.recv().unwrap().is_ok());
    }

    #[cfg(unix)]
    fn shell(script: &str, ready_timeout: Option<u64>) -> ServerSpec {
        ServerSpec {
            program: PathBuf::from("sh"),
            args: vec!["-c".to_string(), script.to_string()],
            ready_timeout: ready_timeout.map(Duration::from_millis),
        }
    }

    #[cfg(unix)]
    #[test]
    fn waits_for_ready_then_stops() {
        crate::logging::init_test_logging();
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("stop.txt");
        let script = format!(
            "echo booting; echo '{{\"type\":\"ready\"}}'; read line; echo \"$line\" > {}",
            log.display()
        );
        let lifecycle = SuiteLifecycle::new(Some(shell(&script, Some(5000))));
        let (done, rx) = Done::channel();
        lifecycle.set_up(done);
        assert!(rx.recv().unwrap().is_ok());
        assert!(lifecycle.is_running());

        lifecycle.tear_down();
        assert!(!lifecycle.is_running());
        let mut received = String::new();
        for _ in 0..100 {
            received = std::fs::read_to_string(&log).unwrap_or_default();
            if !received.is_empty() {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        let message: IpcMessage = serde_json::from_str(received.trim()).unwrap();
        assert_eq!(message, IpcMessage::stop());
    }

    #[cfg(unix)]
    #[test]
    fn early_exit_fails_setup() {
        let lifecycle = SuiteLifecycle::new(Some(shell("exit 0", None)));
        let (done, rx) = Done::channel();
        lifecycle.set_up(done);
        let err = rx.recv().unwrap().unwrap_err();
        assert!(err.to_string().contains("exited before reporting ready"));
        lifecycle.tear_down();
    }

    #[cfg(unix)]
    #[test]
    fn ready_timeout_is_honoured() {
        let lifecycle = SuiteLifecycle::new(Some(shell("sleep 5", Some(100))));
        let (done, rx) = Done::channel();
        lifecycle.set_up(done);
        let err = rx.recv().unwrap().unwrap_err();
        assert!(err.to_string().contains("did not report ready within 100 ms"));
        lifecycle.tear_down();
    }

    #[cfg(unix)]
    #[test]
    fn server_that_never_signals_is_killed() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid.txt");
        let script = format!("echo $$ > {}; exec sleep 30", pid_file.display());
        let lifecycle = SuiteLifecycle::new(Some(shell(&script, Some(300))));
        let (done, rx) = Done::channel();
        lifecycle.set_up(done);
        assert!(rx.recv().unwrap().is_err());
        assert!(!lifecycle.is_running());

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        let alive = Command::new("kill")
            .args(["-0", pid.trim()])
            .stderr(Stdio::null())
            .status()
            .unwrap();
        assert!(!alive.success(), "server {} still running", pid.trim());
    }
}
