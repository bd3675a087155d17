//! Declarative input/output field schema for a task.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::descriptor::SchemaError;

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex"));

/// One named field of a task signature.
///
/// Only `name` is interpreted by the loop; the rest is prompt metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub prefix: String,
    pub description: String,
    pub format: Option<String>,
}

impl FieldSpec {
    /// Field with a prefix derived from its name (`final_answer` -> `Final Answer:`).
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            prefix: default_prefix(&name),
            name,
            description: description.into(),
            format: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }
}

/// Ordered input and output fields supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSignature {
    pub inputs: Vec<FieldSpec>,
    pub outputs: Vec<FieldSpec>,
}

impl TaskSignature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, field: FieldSpec) -> Self {
        self.inputs.push(field);
        self
    }

    pub fn output(mut self, field: FieldSpec) -> Self {
        self.outputs.push(field);
        self
    }

    /// Parse the `"question, context -> answer"` shorthand.
    ///
    /// Descriptions are placeholders of the form `${name}`.
    pub fn parse(shorthand: &str) -> Result<Self, SchemaError> {
        let (inputs, outputs) = shorthand
            .split_once("->")
            .ok_or_else(|| SchemaError::Malformed(format!("missing `->` in {shorthand:?}")))?;
        Ok(Self {
            inputs: parse_names(inputs)?,
            outputs: parse_names(outputs)?,
        })
    }
}

fn parse_names(list: &str) -> Result<Vec<FieldSpec>, SchemaError> {
    let list = list.trim();
    if list.is_empty() {
        return Ok(Vec::new());
    }
    list.split(',')
        .map(str::trim)
        .map(|name| {
            if !IDENTIFIER_RE.is_match(name) {
                return Err(SchemaError::Malformed(format!(
                    "field name {name:?} is not an identifier"
                )));
            }
            Ok(FieldSpec::new(name, format!("${{{name}}}")))
        })
        .collect()
}

fn default_prefix(name: &str) -> String {
    let words: Vec<String> = name
        .split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect();
    format!("{}:", words.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_is_title_cased_name() {
        assert_eq!(FieldSpec::new("question", "").prefix, "Question:");
        assert_eq!(FieldSpec::new("final_answer", "").prefix, "Final Answer:");
    }

    #[test]
    fn parse_shorthand_keeps_field_order() {
        let sig = TaskSignature::parse("question, context -> answer").expect("parse");
        let inputs: Vec<&str> = sig.inputs.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(inputs, vec!["question", "context"]);
        assert_eq!(sig.outputs.len(), 1);
        assert_eq!(sig.outputs[0].name, "answer");
    }

    #[test]
    fn parse_rejects_missing_arrow() {
        let err = TaskSignature::parse("question answer").unwrap_err();
        assert!(matches!(err, SchemaError::Malformed(_)));
    }

    #[test]
    fn parse_rejects_non_identifier_names() {
        let err = TaskSignature::parse("the question -> answer").unwrap_err();
        assert!(err.to_string().contains("not an identifier"));
    }

    #[test]
    fn parse_allows_empty_output_list() {
        let sig = TaskSignature::parse("question ->").expect("parse");
        assert!(sig.outputs.is_empty());
    }
}
