//! Execution adapter: runs fragments on a backend and never lets a failure
//! escape as an error.

use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::core::imports::disallowed_imports;
use crate::core::types::ExecutionResult;
use crate::io::backend::ExecutionBackend;

/// Failure message for an empty fragment; the backend is not contacted.
pub const EMPTY_CODE: &str = "Empty code before execution";

/// Default per-execution budget.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Submits code fragments to an [`ExecutionBackend`] under a fixed timeout.
#[derive(Debug, Clone)]
pub struct ExecutionAdapter {
    timeout: Duration,
    import_allowlist: Option<Vec<String>>,
}

impl Default for ExecutionAdapter {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl ExecutionAdapter {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            import_allowlist: None,
        }
    }

    /// Reject fragments importing modules outside `allowlist` before execution.
    pub fn with_import_allowlist(mut self, allowlist: Option<Vec<String>>) -> Self {
        self.import_allowlist = allowlist;
        self
    }

    /// Run `fragment` and classify the outcome.
    ///
    /// The backend's namespace keeps whatever the fragment binds, including on
    /// failure part-way through.
    #[instrument(skip_all, fields(code_len = fragment.len(), timeout_secs = self.timeout.as_secs()))]
    pub fn run<B: ExecutionBackend + ?Sized>(
        &self,
        backend: &mut B,
        fragment: &str,
    ) -> ExecutionResult {
        if fragment.trim().is_empty() {
            return ExecutionResult::Failure(EMPTY_CODE.to_string());
        }
        if let Some(allowlist) = &self.import_allowlist {
            let rejected = disallowed_imports(fragment, allowlist);
            if !rejected.is_empty() {
                warn!(modules = ?rejected, "fragment imports modules outside allowlist");
                return ExecutionResult::Failure(format!(
                    "Import not allowed: {}",
                    rejected.join(", ")
                ));
            }
        }

        let outcome = backend
            .initialize_if_needed()
            .and_then(|()| backend.execute(fragment, self.timeout));
        match outcome {
            Ok(value) => {
                debug!(value_len = value.len(), "execution succeeded");
                ExecutionResult::Success(value)
            }
            Err(err) => {
                warn!(err = %err, "execution failed");
                ExecutionResult::Failure(err.to_string())
            }
        }
    }
}
