//! Scripted generator and backend for exercising the loop without processes.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::time::Duration;

use anyhow::{Result, anyhow};

use crate::core::types::{Inputs, Mode};
use crate::io::backend::{BackendError, ExecutionBackend};
use crate::io::generator::{CodeGenerator, GenerationRequest, Prediction};

/// Generator that replays queued predictions and records every request.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    queue: RefCell<VecDeque<Prediction>>,
    fallback: Option<Prediction>,
    seen: RefCell<Vec<(Mode, Inputs)>>,
}

impl ScriptedGenerator {
    /// Queue raw `generated_code` texts, returned in order.
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_predictions(responses.into_iter().map(Prediction::code))
    }

    pub fn from_predictions(predictions: impl IntoIterator<Item = Prediction>) -> Self {
        Self {
            queue: RefCell::new(predictions.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Text returned once the queue is drained. Without one, a drained queue errors.
    pub fn with_default(mut self, text: impl Into<String>) -> Self {
        self.fallback = Some(Prediction::code(text));
        self
    }

    pub fn calls(&self) -> usize {
        self.seen.borrow().len()
    }

    pub fn modes(&self) -> Vec<Mode> {
        self.seen.borrow().iter().map(|(mode, _)| *mode).collect()
    }

    /// Input values of every request, in call order.
    pub fn inputs(&self) -> Vec<Inputs> {
        self.seen
            .borrow()
            .iter()
            .map(|(_, inputs)| inputs.clone())
            .collect()
    }
}

impl CodeGenerator for ScriptedGenerator {
    fn complete(&self, request: &GenerationRequest<'_>) -> Result<Prediction> {
        self.seen
            .borrow_mut()
            .push((request.mode(), request.inputs.clone()));
        let call = self.calls();
        self.queue
            .borrow_mut()
            .pop_front()
            .or_else(|| self.fallback.clone())
            .ok_or_else(|| anyhow!("no scripted response for call {call}"))
    }
}

/// Backend that replays queued results and records executed fragments.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    queue: VecDeque<Result<String, BackendError>>,
    fallback: Option<Result<String, BackendError>>,
    init_error: Option<BackendError>,
    variables: Vec<String>,
    initializations: usize,
    executed: Vec<String>,
    last_timeout: Option<Duration>,
}

impl ScriptedBackend {
    pub fn new(results: Vec<Result<String, BackendError>>) -> Self {
        Self {
            queue: results.into(),
            ..Self::default()
        }
    }

    /// Result returned once the queue is drained.
    pub fn with_default(mut self, result: Result<String, BackendError>) -> Self {
        self.fallback = Some(result);
        self
    }

    /// Names reported by `defined_variables`.
    pub fn with_variables<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variables = names.into_iter().map(Into::into).collect();
        self
    }

    /// Make every `initialize_if_needed` call fail with `err`.
    pub fn failing_init(mut self, err: BackendError) -> Self {
        self.init_error = Some(err);
        self
    }

    pub fn initializations(&self) -> usize {
        self.initializations
    }

    pub fn executions(&self) -> usize {
        self.executed.len()
    }

    pub fn executed_code(&self) -> Vec<String> {
        self.executed.clone()
    }

    pub fn last_timeout(&self) -> Option<Duration> {
        self.last_timeout
    }
}

impl ExecutionBackend for ScriptedBackend {
    fn initialize_if_needed(&mut self) -> Result<(), BackendError> {
        self.initializations += 1;
        match &self.init_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn execute(&mut self, code: &str, timeout: Duration) -> Result<String, BackendError> {
        self.executed.push(code.to_string());
        self.last_timeout = Some(timeout);
        self.queue
            .pop_front()
            .or_else(|| self.fallback.clone())
            .unwrap_or_else(|| Err(BackendError::Protocol("no scripted result".to_string())))
    }

    fn defined_variables(&mut self) -> Result<Vec<String>, BackendError> {
        Ok(self.variables.clone())
    }
}
