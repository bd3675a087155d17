//! Shared deterministic types for the repair loop.
//!
//! These types define stable contracts between the extractor, the execution
//! adapter and the loop. They hold no handles to external state.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Named input values passed to the code generator.
pub type Inputs = BTreeMap<String, String>;

/// Prompting stage requested from the code generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// First attempt: answer the task from its inputs.
    Generate,
    /// Follow-up attempt: fix the previous code given its error.
    Regenerate,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Generate => "generate",
            Mode::Regenerate => "regenerate",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single execution attempt.
///
/// Produced once per attempt and replaced (never mutated) by the next one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "lowercase")]
pub enum ExecutionResult {
    /// The fragment ran; holds the rendered value of its final expression.
    Success(String),
    /// The fragment could not run or raised; holds the failure message.
    Failure(String),
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Success(_))
    }

    pub fn failure_message(&self) -> Option<&str> {
        match self {
            ExecutionResult::Success(_) => None,
            ExecutionResult::Failure(message) => Some(message),
        }
    }
}

/// Everything observed during one generate/extract/execute attempt.
///
/// `index` is 0 for the initial generation and counts regenerations after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptRecord {
    pub index: u32,
    pub mode: Mode,
    /// Text of the `generated_code` field as returned by the generator.
    pub raw_response: String,
    /// Reasoning emitted alongside the code, when the generator provides it.
    pub reasoning: Option<String>,
    /// Fragment handed to the execution adapter.
    pub code: String,
    pub extraction_error: Option<String>,
    pub result: ExecutionResult,
}
