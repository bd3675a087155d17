//! Prompt rendering for text-in/JSON-out code generators.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

use crate::core::descriptor::PREVIOUS_CODE;
use crate::core::signature::FieldSpec;
use crate::io::generator::GenerationRequest;

const PROGRAM_TEMPLATE: &str = include_str!("prompts/program.md");

#[derive(Debug, Serialize)]
struct FieldContext<'a> {
    name: &'a str,
    prefix: &'a str,
    description: &'a str,
    value: String,
}

#[derive(Debug, Serialize)]
struct ExtraContext {
    prefix: String,
    value: String,
    code: bool,
}

/// Renders generation requests into a single prompt string.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    value_limit_bytes: usize,
}

impl PromptBuilder {
    /// Builder that truncates each input value beyond `value_limit_bytes`.
    pub fn new(value_limit_bytes: usize) -> Self {
        Self { value_limit_bytes }
    }

    pub fn render(&self, request: &GenerationRequest<'_>) -> Result<String> {
        let mut env = Environment::new();
        env.add_template("program", PROGRAM_TEMPLATE)
            .context("load program template")?;
        let template = env.get_template("program")?;

        let descriptor = request.descriptor;
        let inputs: Vec<FieldContext<'_>> = descriptor
            .inputs
            .iter()
            .map(|field| FieldContext {
                name: &field.name,
                prefix: &field.prefix,
                description: &field.description,
                value: self.bounded(request.inputs.get(&field.name).map_or("", String::as_str)),
            })
            .collect();
        let extras: Vec<ExtraContext> = request
            .extra_inputs()
            .into_iter()
            .map(|(name, value)| ExtraContext {
                prefix: FieldSpec::new(name, "").prefix,
                value: self.bounded(value),
                code: name == PREVIOUS_CODE,
            })
            .collect();

        let rendered = template
            .render(context! {
                instructions => descriptor.instructions(),
                inputs => inputs,
                extras => extras,
                output => FieldContext {
                    name: &descriptor.output.name,
                    prefix: &descriptor.output.prefix,
                    description: &descriptor.output.description,
                    value: String::new(),
                },
                answer => descriptor.answer.as_str(),
            })
            .context("render program prompt")?;
        debug!(mode = %request.mode(), bytes = rendered.len(), "rendered prompt");
        Ok(rendered)
    }

    fn bounded(&self, value: &str) -> String {
        let value = value.trim();
        if value.len() <= self.value_limit_bytes {
            return value.to_string();
        }
        let mut cut = self.value_limit_bytes;
        while !value.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}\n[truncated {} bytes]", &value[..cut], value.len() - cut)
    }
}
