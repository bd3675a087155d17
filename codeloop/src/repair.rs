//! Generate → execute → regenerate loop.
//!
//! One [`RepairLoop::forward`] call asks the generator for code, runs it on the
//! caller's backend, and on failure feeds the previous fragment and its error
//! back to the generator in [`Mode::Regenerate`]. The loop stops at the first
//! successful execution or after `max_iters` regenerations.

use std::time::Duration;

use anyhow::{Result, bail};
use tracing::{debug, info, instrument, warn};

use crate::core::descriptor::{
    DEFINED_VARIABLES, ERROR, GENERATED_CODE, ModeDescriptor, PREVIOUS_CODE, TaskDescriptor,
};
use crate::core::extract::extract;
use crate::core::types::{AttemptRecord, ExecutionResult, Inputs, Mode};
use crate::execution::ExecutionAdapter;
use crate::io::backend::ExecutionBackend;
use crate::io::config::LoopConfig;
use crate::io::generator::{CodeGenerator, GenerationRequest, REASONING};

/// Loop limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairConfig {
    /// Regenerations allowed after the initial generation.
    pub max_iters: u32,
    pub exec_timeout: Duration,
    pub import_allowlist: Option<Vec<String>>,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self::from(&LoopConfig::default())
    }
}

impl From<&LoopConfig> for RepairConfig {
    fn from(config: &LoopConfig) -> Self {
        Self {
            max_iters: config.max_iters,
            exec_timeout: config.exec_timeout(),
            import_allowlist: config.import_allowlist.clone(),
        }
    }
}

/// Terminal result of one loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairOutcome {
    /// A fragment executed successfully; `value` is its rendered result and
    /// may legitimately be empty.
    Answered {
        value: String,
        attempts: Vec<AttemptRecord>,
    },
    /// Every attempt failed.
    Exhausted {
        last_error: String,
        attempts: Vec<AttemptRecord>,
    },
}

impl RepairOutcome {
    pub fn is_answered(&self) -> bool {
        matches!(self, Self::Answered { .. })
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Answered { value, .. } => Some(value),
            Self::Exhausted { .. } => None,
        }
    }

    pub fn into_value(self) -> Option<String> {
        match self {
            Self::Answered { value, .. } => Some(value),
            Self::Exhausted { .. } => None,
        }
    }

    pub fn last_error(&self) -> Option<&str> {
        match self {
            Self::Answered { .. } => None,
            Self::Exhausted { last_error, .. } => Some(last_error),
        }
    }

    pub fn attempts(&self) -> &[AttemptRecord] {
        match self {
            Self::Answered { attempts, .. } | Self::Exhausted { attempts, .. } => attempts,
        }
    }
}

/// Mutable state carried between attempts.
#[derive(Debug)]
struct LoopState {
    attempt: u32,
    mode: Mode,
    inputs: Inputs,
    /// `defined_variables` is read from the backend rather than supplied.
    track_variables: bool,
    attempts: Vec<AttemptRecord>,
}

impl LoopState {
    fn new(inputs: Inputs, track_variables: bool) -> Self {
        Self {
            attempt: 0,
            mode: Mode::Generate,
            inputs,
            track_variables,
            attempts: Vec::new(),
        }
    }

    /// Replace the carried fragment/error pair and switch to regeneration.
    fn retry_with(&mut self, code: String, error: String, variables: Option<String>) {
        self.attempt += 1;
        self.mode = Mode::Regenerate;
        self.inputs.insert(PREVIOUS_CODE.to_string(), code);
        self.inputs.insert(ERROR.to_string(), error);
        if let Some(variables) = variables {
            self.inputs.insert(DEFINED_VARIABLES.to_string(), variables);
        }
    }
}

/// Drives a [`CodeGenerator`] against an [`ExecutionBackend`].
pub struct RepairLoop<G> {
    required: Vec<String>,
    generate: ModeDescriptor,
    regenerate: ModeDescriptor,
    generator: G,
    adapter: ExecutionAdapter,
    max_iters: u32,
}

impl<G: CodeGenerator> RepairLoop<G> {
    pub fn new(descriptor: &TaskDescriptor, generator: G, config: RepairConfig) -> Self {
        Self {
            required: descriptor
                .base_inputs()
                .iter()
                .map(|field| field.name.clone())
                .collect(),
            generate: descriptor.derive(Mode::Generate),
            regenerate: descriptor.derive(Mode::Regenerate),
            generator,
            adapter: ExecutionAdapter::new(config.exec_timeout)
                .with_import_allowlist(config.import_allowlist),
            max_iters: config.max_iters,
        }
    }

    /// Run the loop once for `inputs`.
    ///
    /// Generator errors and missing inputs are fatal. Execution failures are
    /// retried; exhausting the budget returns [`RepairOutcome::Exhausted`].
    #[instrument(skip_all, fields(max_iters = self.max_iters))]
    pub fn forward<B: ExecutionBackend + ?Sized>(
        &self,
        backend: &mut B,
        inputs: Inputs,
    ) -> Result<RepairOutcome> {
        let track_variables = !inputs.contains_key(DEFINED_VARIABLES);
        let inputs = self.complete_inputs(backend, inputs)?;
        let mut state = LoopState::new(inputs, track_variables);

        loop {
            let descriptor = match state.mode {
                Mode::Generate => &self.generate,
                Mode::Regenerate => &self.regenerate,
            };
            info!(attempt = state.attempt, mode = %state.mode, "requesting code");
            let prediction = self.generator.complete(&GenerationRequest {
                descriptor,
                inputs: &state.inputs,
            })?;
            let raw = prediction.get(GENERATED_CODE).unwrap_or_default();

            let extraction = extract(raw);
            let extraction_error = extraction.error.map(|err| err.to_string());
            debug!(code = %extraction.code, error = ?extraction_error, "extracted fragment");

            let result = self.adapter.run(backend, &extraction.code);
            state.attempts.push(AttemptRecord {
                index: state.attempt,
                mode: state.mode,
                raw_response: raw.to_string(),
                reasoning: prediction.get(REASONING).map(str::to_string),
                code: extraction.code.clone(),
                extraction_error: extraction_error.clone(),
                result: result.clone(),
            });

            let message = match result {
                ExecutionResult::Success(value) => {
                    info!(attempt = state.attempt, "fragment executed");
                    return Ok(RepairOutcome::Answered {
                        value,
                        attempts: state.attempts,
                    });
                }
                ExecutionResult::Failure(message) => match extraction_error {
                    Some(extraction_error) if extraction_error != message => {
                        format!("{extraction_error}; {message}")
                    }
                    _ => message,
                },
            };

            if state.attempt >= self.max_iters {
                warn!(attempts = state.attempts.len(), error = %message, "repair budget exhausted");
                return Ok(RepairOutcome::Exhausted {
                    last_error: message,
                    attempts: state.attempts,
                });
            }
            warn!(attempt = state.attempt, error = %message, "fragment failed, regenerating");
            let variables = state.track_variables.then(|| list_variables(backend));
            state.retry_with(extraction.code, message, variables);
        }
    }

    fn complete_inputs<B: ExecutionBackend + ?Sized>(
        &self,
        backend: &mut B,
        mut inputs: Inputs,
    ) -> Result<Inputs> {
        let missing: Vec<&str> = self
            .required
            .iter()
            .map(String::as_str)
            .filter(|name| !inputs.contains_key(*name))
            .collect();
        if !missing.is_empty() {
            bail!("missing input field(s): {}", missing.join(", "));
        }

        if !inputs.contains_key(DEFINED_VARIABLES) {
            inputs.insert(DEFINED_VARIABLES.to_string(), list_variables(backend));
        }
        Ok(inputs)
    }
}

/// Names bound in the backend's namespace, comma separated.
fn list_variables<B: ExecutionBackend + ?Sized>(backend: &mut B) -> String {
    match backend.defined_variables() {
        Ok(names) => names.join(", "),
        Err(err) => {
            warn!(err = %err, "could not list defined variables");
            String::new()
        }
    }
}
