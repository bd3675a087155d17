//! Persistent `python3` session used as the default execution backend.
//!
//! The interpreter runs an embedded JSON-lines loop (`python/session_runner.py`)
//! that keeps one namespace for the lifetime of the process. Replies are read
//! by a dedicated thread and awaited with a timeout, so a runaway fragment never
//! blocks the caller past its budget. On timeout or protocol failure the
//! interpreter is killed and lazily restarted on the next call, which drops its
//! namespace.

use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::io::backend::{BackendError, ExecutionBackend};

const SESSION_RUNNER: &str = include_str!("python/session_runner.py");
const VARIABLES_TIMEOUT: Duration = Duration::from_secs(5);
const STDERR_TAIL_BYTES: usize = 4_096;

#[derive(Debug, Deserialize)]
struct Reply {
    ok: bool,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    names: Option<Vec<String>>,
    #[serde(default)]
    error: Option<String>,
}

struct Interpreter {
    child: Child,
    stdin: ChildStdin,
    replies: Receiver<std::io::Result<String>>,
    stderr_tail: Arc<Mutex<String>>,
}

impl Interpreter {
    fn spawn(command: &[String]) -> Result<Self, BackendError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| BackendError::Spawn("empty interpreter command".to_string()))?;
        let mut child = Command::new(program)
            .args(args)
            .arg("-u")
            .arg("-c")
            .arg(SESSION_RUNNER)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| BackendError::Spawn(format!("{program}: {err}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BackendError::Spawn("stdin was not piped".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BackendError::Spawn("stdout was not piped".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| BackendError::Spawn("stderr was not piped".to_string()))?;

        let (tx, replies) = mpsc::channel();
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        let stderr_tail = Arc::new(Mutex::new(String::new()));
        let tail = Arc::clone(&stderr_tail);
        thread::spawn(move || drain_stderr(stderr, &tail));

        Ok(Self {
            child,
            stdin,
            replies,
            stderr_tail,
        })
    }

    fn request(&mut self, payload: &serde_json::Value, timeout: Duration) -> Result<Reply, BackendError> {
        let mut line = serde_json::to_string(payload)
            .map_err(|err| BackendError::Protocol(format!("encode request: {err}")))?;
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .and_then(|()| self.stdin.flush())
            .map_err(|err| BackendError::Crashed(format!("write request: {err}; {}", self.stderr())))?;

        match self.replies.recv_timeout(timeout) {
            Ok(Ok(line)) => serde_json::from_str(line.trim()).map_err(|err| {
                BackendError::Protocol(format!("invalid reply: {err}; raw={}", line.trim()))
            }),
            Ok(Err(err)) => Err(BackendError::Crashed(format!("read reply: {err}"))),
            Err(RecvTimeoutError::Timeout) => Err(BackendError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(BackendError::Crashed(self.stderr())),
        }
    }

    fn stderr(&self) -> String {
        self.stderr_tail
            .lock()
            .map(|tail| tail.trim().to_string())
            .unwrap_or_default()
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        self.child.kill().ok();
        self.child.wait().ok();
    }
}

fn drain_stderr<R: Read>(stderr: R, tail: &Mutex<String>) {
    for line in BufReader::new(stderr).lines() {
        let Ok(line) = line else { break };
        let Ok(mut buf) = tail.lock() else { break };
        buf.push_str(&line);
        buf.push('\n');
        if buf.len() > STDERR_TAIL_BYTES {
            let mut cut = buf.len() - STDERR_TAIL_BYTES;
            while !buf.is_char_boundary(cut) {
                cut += 1;
            }
            buf.drain(..cut);
        }
    }
}

/// Execution backend backed by a long-lived python interpreter process.
pub struct PythonSession {
    command: Vec<String>,
    interpreter: Option<Interpreter>,
}

impl PythonSession {
    /// Session that will run `command` (e.g. `["python3"]`) on first use.
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            interpreter: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.interpreter.is_some()
    }

    /// Kill the interpreter; the next call starts a fresh namespace.
    pub fn shutdown(&mut self) {
        if self.interpreter.take().is_some() {
            debug!("python session shut down");
        }
    }

    fn request(&mut self, payload: serde_json::Value, timeout: Duration) -> Result<Reply, BackendError> {
        self.initialize_if_needed()?;
        let interpreter = self
            .interpreter
            .as_mut()
            .ok_or_else(|| BackendError::Crashed("interpreter not running".to_string()))?;
        let reply = interpreter.request(&payload, timeout);
        if let Err(err) = &reply {
            warn!(err = %err, "python session failed, restarting on next use");
            self.shutdown();
        }
        let reply = reply?;
        if reply.ok {
            Ok(reply)
        } else {
            Err(BackendError::Runtime(
                reply.error.unwrap_or_else(|| "unknown error".to_string()),
            ))
        }
    }
}

impl Default for PythonSession {
    fn default() -> Self {
        Self::new(vec!["python3".to_string()])
    }
}

impl ExecutionBackend for PythonSession {
    fn initialize_if_needed(&mut self) -> Result<(), BackendError> {
        if self.interpreter.is_none() {
            info!(command = ?self.command, "starting python session");
            self.interpreter = Some(Interpreter::spawn(&self.command)?);
        }
        Ok(())
    }

    #[instrument(skip_all, fields(code_len = code.len(), timeout_secs = timeout.as_secs()))]
    fn execute(&mut self, code: &str, timeout: Duration) -> Result<String, BackendError> {
        let reply = self.request(json!({ "type": "exec", "code": code }), timeout)?;
        reply
            .value
            .ok_or_else(|| BackendError::Protocol("exec reply without value".to_string()))
    }

    fn defined_variables(&mut self) -> Result<Vec<String>, BackendError> {
        let reply = self.request(json!({ "type": "variables" }), VARIABLES_TIMEOUT)?;
        Ok(reply.names.unwrap_or_default())
    }
}
