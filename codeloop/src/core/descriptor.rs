//! Task descriptor and the per-mode descriptors derived from it.
//!
//! A [`TaskDescriptor`] is built once from a [`TaskSignature`] and never
//! mutated. Each call to [`TaskDescriptor::derive`] computes a fresh
//! [`ModeDescriptor`] carrying the field lists and instruction text for one
//! prompting stage.

use std::collections::HashSet;

use thiserror::Error;

use crate::core::signature::{FieldSpec, TaskSignature};
use crate::core::types::Mode;

/// Input field listing variables already bound in the execution session.
pub const DEFINED_VARIABLES: &str = "defined_variables";
/// Regenerate-only input carrying the previous failure message.
pub const ERROR: &str = "error";
/// Call-time input carrying the previous fragment during regeneration.
pub const PREVIOUS_CODE: &str = "previous_code";
/// The single output requested from the code generator.
pub const GENERATED_CODE: &str = "generated_code";

const RESERVED: [&str; 3] = [ERROR, PREVIOUS_CODE, GENERATED_CODE];

/// Construction-time schema violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("signature declares no output field")]
    NoOutputField,
    #[error("only one output field supported (found {count})")]
    MultipleOutputFields { count: usize },
    #[error("duplicate field {0:?}")]
    DuplicateField(String),
    #[error("field name {0:?} is reserved")]
    ReservedField(String),
    #[error("malformed signature: {0}")]
    Malformed(String),
}

/// Immutable description of one code-answering task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDescriptor {
    defined_variables: FieldSpec,
    inputs: Vec<FieldSpec>,
    answer: FieldSpec,
}

/// Fields and instruction text for a single prompting stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeDescriptor {
    pub mode: Mode,
    pub inputs: Vec<FieldSpec>,
    pub output: FieldSpec,
    /// Name of the task's own output field (what the code must compute).
    pub answer: String,
    pub instructions: String,
}

impl ModeDescriptor {
    pub fn input_names(&self) -> Vec<&str> {
        self.inputs.iter().map(|field| field.name.as_str()).collect()
    }

    pub fn output_name(&self) -> &str {
        &self.output.name
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }
}

impl TaskDescriptor {
    /// Validate `signature` and synthesize the `defined_variables` input.
    pub fn build(signature: TaskSignature) -> Result<Self, SchemaError> {
        let TaskSignature { inputs, mut outputs } = signature;
        let answer = match outputs.len() {
            0 => return Err(SchemaError::NoOutputField),
            1 => outputs.remove(0),
            count => return Err(SchemaError::MultipleOutputFields { count }),
        };

        let mut seen = HashSet::new();
        let mut defined_variables = defined_variables_field();
        let mut base = Vec::with_capacity(inputs.len());
        for field in inputs.into_iter().chain(std::iter::once(answer.clone())) {
            if RESERVED.contains(&field.name.as_str()) {
                return Err(SchemaError::ReservedField(field.name));
            }
            if !seen.insert(field.name.clone()) {
                return Err(SchemaError::DuplicateField(field.name));
            }
            if field.name == answer.name {
                continue;
            }
            if field.name == DEFINED_VARIABLES {
                defined_variables = field;
            } else {
                base.push(field);
            }
        }

        Ok(Self {
            defined_variables,
            inputs: base,
            answer,
        })
    }

    /// Caller-supplied input fields, excluding `defined_variables`.
    pub fn base_inputs(&self) -> &[FieldSpec] {
        &self.inputs
    }

    /// Compute the descriptor for `mode`.
    pub fn derive(&self, mode: Mode) -> ModeDescriptor {
        let mut inputs = Vec::with_capacity(self.inputs.len() + 2);
        inputs.push(self.defined_variables.clone());
        inputs.extend(self.inputs.iter().cloned());
        if mode == Mode::Regenerate {
            inputs.push(error_field());
        }

        let names: Vec<&str> = inputs.iter().map(|field| field.name.as_str()).collect();
        let instructions = instructions(mode, &names, &self.answer.name);

        ModeDescriptor {
            mode,
            inputs,
            output: generated_code_field(),
            answer: self.answer.name.clone(),
            instructions,
        }
    }
}

fn instructions(mode: Mode, inputs: &[&str], answer: &str) -> String {
    let inputs = inputs
        .iter()
        .map(|name| format!("`{name}`"))
        .collect::<Vec<_>>()
        .join(", ");
    let answer = format!("`{answer}`");
    let lines = match mode {
        Mode::Generate => [
            format!("You will be given {inputs} and you will respond with {answer}."),
            format!("Generate executable Python code that programmatically computes the correct {answer}."),
            "Use variable names that are clear, meaningful, and convey their specific purpose and content.".to_string(),
            format!("After you're done with the computation, make sure the last line in your code evaluates to the correct value for {answer}."),
        ],
        Mode::Regenerate => [
            format!("You are given {inputs} due to an error in previous code."),
            "The previously generated code is supplied as `previous_code`.".to_string(),
            "Use variable names that are clear, meaningful, and convey their specific purpose and content.".to_string(),
            format!("Your task is to correct the error and provide the new {answer}."),
        ],
    };
    lines.join("\n")
}

fn defined_variables_field() -> FieldSpec {
    FieldSpec::new(
        DEFINED_VARIABLES,
        "list of previously defined variables in the execution session",
    )
    .with_prefix("Defined Variables:")
    .with_format("str")
}

fn error_field() -> FieldSpec {
    FieldSpec::new(ERROR, "error message from previously-generated python code")
        .with_prefix("Error:")
}

fn generated_code_field() -> FieldSpec {
    FieldSpec::new(GENERATED_CODE, "python code that answers the question")
        .with_prefix("Code:")
        .with_format("str")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question_answer() -> TaskDescriptor {
        TaskDescriptor::build(TaskSignature::parse("question -> answer").expect("parse"))
            .expect("build")
    }

    #[test]
    fn build_rejects_multiple_outputs() {
        let sig = TaskSignature::parse("question -> answer, confidence").expect("parse");
        assert_eq!(
            TaskDescriptor::build(sig).unwrap_err(),
            SchemaError::MultipleOutputFields { count: 2 }
        );
    }

    #[test]
    fn build_rejects_missing_output() {
        let sig = TaskSignature::parse("question ->").expect("parse");
        assert_eq!(
            TaskDescriptor::build(sig).unwrap_err(),
            SchemaError::NoOutputField
        );
    }

    #[test]
    fn build_rejects_reserved_and_duplicate_names() {
        let sig = TaskSignature::parse("question, error -> answer").expect("parse");
        assert_eq!(
            TaskDescriptor::build(sig).unwrap_err(),
            SchemaError::ReservedField("error".to_string())
        );

        let sig = TaskSignature::parse("question, question -> answer").expect("parse");
        assert_eq!(
            TaskDescriptor::build(sig).unwrap_err(),
            SchemaError::DuplicateField("question".to_string())
        );

        let sig = TaskSignature::parse("answer -> answer").expect("parse");
        assert!(matches!(
            TaskDescriptor::build(sig).unwrap_err(),
            SchemaError::DuplicateField(_)
        ));
    }

    #[test]
    fn generate_mode_adds_defined_variables() {
        let mode = question_answer().derive(Mode::Generate);
        assert_eq!(mode.input_names(), vec!["defined_variables", "question"]);
        assert_eq!(mode.output_name(), "generated_code");
        assert_eq!(mode.answer, "answer");
    }

    #[test]
    fn regenerate_mode_adds_error_field() {
        let mode = question_answer().derive(Mode::Regenerate);
        assert_eq!(
            mode.input_names(),
            vec!["defined_variables", "question", "error"]
        );
        assert!(!mode.input_names().contains(&"previous_code"));
    }

    #[test]
    fn instructions_substitute_field_names() {
        let descriptor = question_answer();

        let generate = descriptor.derive(Mode::Generate);
        assert!(
            generate
                .instructions()
                .contains("`defined_variables`, `question`")
        );
        assert!(generate.instructions().contains("`answer`"));
        assert!(!generate.instructions().contains("`error`"));

        let regenerate = descriptor.derive(Mode::Regenerate);
        assert!(
            regenerate
                .instructions()
                .contains("`defined_variables`, `question`, `error`")
        );
        assert!(regenerate.instructions().contains("`answer`"));
    }

    #[test]
    fn base_defined_variables_replaces_synthesized_field() {
        let sig = TaskSignature::new()
            .input(FieldSpec::new("defined_variables", "custom").with_prefix("Vars:"))
            .input(FieldSpec::new("question", "q"))
            .output(FieldSpec::new("answer", "a"));
        let descriptor = TaskDescriptor::build(sig).expect("build");
        let base: Vec<&str> = descriptor
            .base_inputs()
            .iter()
            .map(|field| field.name.as_str())
            .collect();
        assert_eq!(base, vec!["question"]);

        let mode = descriptor.derive(Mode::Generate);
        assert_eq!(mode.input_names(), vec!["defined_variables", "question"]);
        assert_eq!(mode.inputs[0].prefix, "Vars:");
    }

    #[test]
    fn derive_is_deterministic() {
        let descriptor = question_answer();
        assert_eq!(
            descriptor.derive(Mode::Regenerate),
            descriptor.derive(Mode::Regenerate)
        );
    }
}
