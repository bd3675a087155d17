//! Code generator abstraction.
//!
//! The [`CodeGenerator`] trait decouples the repair loop from the model that
//! writes code (currently `codex exec`, see [`crate::io::codex`]). Tests use
//! scripted generators that return predetermined text.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::core::descriptor::{GENERATED_CODE, ModeDescriptor};
use crate::core::types::{Inputs, Mode};

/// Output field carrying the model's reasoning, when the generator emits one.
pub const REASONING: &str = "reasoning";

/// One call to the code generator.
#[derive(Debug, Clone)]
pub struct GenerationRequest<'a> {
    pub descriptor: &'a ModeDescriptor,
    /// Values for the descriptor's inputs plus call-time extras such as
    /// `previous_code`.
    pub inputs: &'a Inputs,
}

impl GenerationRequest<'_> {
    pub fn mode(&self) -> Mode {
        self.descriptor.mode
    }

    /// Inputs that are not declared by the descriptor, in name order.
    pub fn extra_inputs(&self) -> Vec<(&str, &str)> {
        let declared = self.descriptor.input_names();
        self.inputs
            .iter()
            .filter(|(name, _)| !declared.contains(&name.as_str()))
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect()
    }
}

/// Filled-in output fields returned by a generator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Prediction {
    fields: BTreeMap<String, String>,
}

impl Prediction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prediction holding only `generated_code`.
    pub fn code(text: impl Into<String>) -> Self {
        Self::new().with(GENERATED_CODE, text)
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Abstraction over code-writing backends.
pub trait CodeGenerator {
    /// Fill in the descriptor's output field for the given inputs.
    ///
    /// Errors are fatal to the loop invocation.
    fn complete(&self, request: &GenerationRequest<'_>) -> Result<Prediction>;
}

impl<G: CodeGenerator + ?Sized> CodeGenerator for &G {
    fn complete(&self, request: &GenerationRequest<'_>) -> Result<Prediction> {
        (**self).complete(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::descriptor::{PREVIOUS_CODE, TaskDescriptor};
    use crate::core::signature::TaskSignature;

    #[test]
    fn extra_inputs_exclude_declared_fields() {
        let descriptor =
            TaskDescriptor::build(TaskSignature::parse("question -> answer").expect("parse"))
                .expect("build")
                .derive(Mode::Regenerate);
        let inputs = Inputs::from([
            ("question".to_string(), "q".to_string()),
            ("error".to_string(), "boom".to_string()),
            (PREVIOUS_CODE.to_string(), "x = 1".to_string()),
        ]);
        let request = GenerationRequest {
            descriptor: &descriptor,
            inputs: &inputs,
        };

        assert_eq!(request.mode(), Mode::Regenerate);
        assert_eq!(request.extra_inputs(), vec![(PREVIOUS_CODE, "x = 1")]);
    }

    #[test]
    fn prediction_exposes_fields_by_name() {
        let prediction = Prediction::code("x = 1").with(REASONING, "simple");
        assert_eq!(prediction.get(GENERATED_CODE), Some("x = 1"));
        assert_eq!(prediction.get(REASONING), Some("simple"));
        assert_eq!(prediction.get("answer"), None);
    }
}
