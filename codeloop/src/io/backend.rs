//! Execution backend abstraction.
//!
//! The [`ExecutionBackend`] trait decouples the repair loop from the
//! interpreter that actually runs fragments (currently a persistent `python3`
//! process, see [`crate::io::python`]). Tests use scripted backends that return
//! predetermined results without spawning processes.
//!
//! A backend owns a variable namespace that outlives a single call. Methods take
//! `&mut self`, so one session cannot be driven by two loops at once; callers
//! that need parallelism create independent sessions.

use std::time::Duration;

use thiserror::Error;

/// Failure reported by an execution backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("TimeoutError: execution exceeded {}s", .0.as_secs_f64())]
    Timeout(Duration),
    /// The fragment raised; the message is the interpreter's rendering.
    #[error("{0}")]
    Runtime(String),
    #[error("interpreter protocol error: {0}")]
    Protocol(String),
    #[error("interpreter exited unexpectedly: {0}")]
    Crashed(String),
    #[error("failed to start interpreter: {0}")]
    Spawn(String),
}

/// Stateful interpreter session.
pub trait ExecutionBackend {
    /// Start the interpreter if it is not running yet. Must be idempotent.
    fn initialize_if_needed(&mut self) -> Result<(), BackendError>;

    /// Run `code` and return the rendered value of its final expression.
    fn execute(&mut self, code: &str, timeout: Duration) -> Result<String, BackendError>;

    /// Names currently bound in the session's namespace.
    fn defined_variables(&mut self) -> Result<Vec<String>, BackendError> {
        Ok(Vec::new())
    }
}

impl<B: ExecutionBackend + ?Sized> ExecutionBackend for &mut B {
    fn initialize_if_needed(&mut self) -> Result<(), BackendError> {
        (**self).initialize_if_needed()
    }

    fn execute(&mut self, code: &str, timeout: Duration) -> Result<String, BackendError> {
        (**self).execute(code, timeout)
    }

    fn defined_variables(&mut self) -> Result<Vec<String>, BackendError> {
        (**self).defined_variables()
    }
}
