//! Code generator that shells out to `codex exec`.
//!
//! Each call writes a JSON Schema describing the mode's outputs, pipes the
//! rendered prompt to the CLI, and reads the structured answer the CLI writes
//! to `--output-last-message`. The answer is validated against the schema
//! before it reaches the loop.

use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::Draft;
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use crate::core::descriptor::ModeDescriptor;
use crate::io::config::GeneratorConfig;
use crate::io::generator::{CodeGenerator, GenerationRequest, Prediction, REASONING};
use crate::io::process::run_with_timeout;
use crate::io::prompt::PromptBuilder;

/// [`CodeGenerator`] backed by the Codex CLI.
pub struct CodexGenerator {
    command: Vec<String>,
    workdir: PathBuf,
    state_dir: PathBuf,
    timeout: Duration,
    output_limit_bytes: usize,
    prompts: PromptBuilder,
    calls: Cell<u32>,
}

impl CodexGenerator {
    pub fn new(config: &GeneratorConfig, workdir: &Path) -> Self {
        Self {
            command: config.command.clone(),
            workdir: workdir.to_path_buf(),
            state_dir: workdir.join(&config.state_dir),
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
            prompts: PromptBuilder::new(config.prompt_value_limit_bytes),
            calls: Cell::new(0),
        }
    }
}

impl CodeGenerator for CodexGenerator {
    #[instrument(skip_all, fields(mode = %request.mode(), timeout_secs = self.timeout.as_secs()))]
    fn complete(&self, request: &GenerationRequest<'_>) -> Result<Prediction> {
        let call = self.calls.get() + 1;
        self.calls.set(call);

        let call_dir = self
            .state_dir
            .join("generations")
            .join(format!("{call:03}-{}", request.mode()));
        fs::create_dir_all(&call_dir)
            .with_context(|| format!("create generation dir {}", call_dir.display()))?;

        let schema = output_schema(request.descriptor);
        let schema_path = call_dir.join("output.schema.json");
        let output_path = call_dir.join("output.json");
        write_json(&schema_path, &schema)?;

        let prompt = self.prompts.render(request)?;
        fs::write(call_dir.join("prompt.md"), &prompt)
            .with_context(|| format!("write prompt {}", call_dir.display()))?;

        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("generator command is empty"))?;
        let mut cmd = Command::new(program);
        cmd.args(args)
            .arg("--skip-git-repo-check")
            .arg("--output-schema")
            .arg(&schema_path)
            .arg("--output-last-message")
            .arg(&output_path)
            .arg("-")
            .current_dir(&self.workdir);

        info!(call, "requesting code from codex");
        let output = run_with_timeout(cmd, Some(prompt.as_bytes()), self.timeout, self.output_limit_bytes)
            .context("run codex exec")?;
        let log_path = call_dir.join("codex.log");
        fs::write(&log_path, output.render_log("codex"))
            .with_context(|| format!("write codex log {}", log_path.display()))?;

        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "codex exec timed out");
            bail!("codex exec timed out after {:?}", self.timeout);
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "codex exec failed");
            bail!("codex exec failed with status {:?}", output.status.code());
        }

        let answer = read_answer(&output_path, &schema)?;
        debug!(fields = ?answer, "parsed codex answer");
        Ok(answer)
    }
}

/// JSON Schema for the mode's outputs: `reasoning` plus the code field.
pub fn output_schema(descriptor: &ModeDescriptor) -> Value {
    let code = descriptor.output_name();
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "type": "object",
        "additionalProperties": false,
        "required": [REASONING, code],
        "properties": {
            REASONING: { "type": "string", "description": "step-by-step reasoning" },
            code: { "type": "string", "description": descriptor.output.description },
        },
    })
}

fn read_answer(path: &Path, schema: &Value) -> Result<Prediction> {
    if !path.exists() {
        bail!("missing codex output {}", path.display());
    }
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let instance: Value =
        serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
    validate_answer(&instance, schema)?;
    serde_json::from_value(instance).with_context(|| format!("decode {}", path.display()))
}

/// Validate a generator answer against its output schema (Draft 2020-12).
pub fn validate_answer(instance: &Value, schema: &Value) -> Result<()> {
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(schema)
        .context("compile output schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("codex output failed validation:\n- {}", messages.join("\n- "));
    }
    Ok(())
}

fn write_json(path: &Path, value: &Value) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value).context("serialize json")?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::descriptor::{GENERATED_CODE, TaskDescriptor};
    use crate::core::signature::TaskSignature;
    use crate::core::types::{Inputs, Mode};

    fn generate_mode() -> ModeDescriptor {
        TaskDescriptor::build(TaskSignature::parse("question -> answer").expect("parse"))
            .expect("build")
            .derive(Mode::Generate)
    }

    #[test]
    fn schema_requires_reasoning_and_code() {
        let schema = output_schema(&generate_mode());
        let ok = json!({ "reasoning": "r", "generated_code": "x = 1" });
        validate_answer(&ok, &schema).expect("valid");

        let missing = json!({ "reasoning": "r" });
        let err = validate_answer(&missing, &schema).unwrap_err();
        assert!(err.to_string().contains("generated_code"));

        let extra = json!({ "reasoning": "r", "generated_code": "x", "answer": 1 });
        assert!(validate_answer(&extra, &schema).is_err());
    }

    #[test]
    fn read_answer_decodes_prediction() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("output.json");
        fs::write(&path, r#"{"reasoning":"add","generated_code":"x = 1 + 1\nx"}"#)
            .expect("write");

        let prediction = read_answer(&path, &output_schema(&generate_mode())).expect("read");
        assert_eq!(prediction.get(GENERATED_CODE), Some("x = 1 + 1\nx"));
        assert_eq!(prediction.get(REASONING), Some("add"));
    }

    #[test]
    fn read_answer_errors_on_missing_output() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = read_answer(&temp.path().join("output.json"), &json!({})).unwrap_err();
        assert!(err.to_string().contains("missing codex output"));
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_is_fatal() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = GeneratorConfig {
            command: vec!["false".to_string()],
            ..GeneratorConfig::default()
        };
        let generator = CodexGenerator::new(&config, temp.path());
        let mode = generate_mode();
        let inputs = Inputs::from([("question".to_string(), "q".to_string())]);

        let err = generator
            .complete(&GenerationRequest {
                descriptor: &mode,
                inputs: &inputs,
            })
            .unwrap_err();
        assert!(err.to_string().contains("codex exec failed"));
        assert!(
            temp.path()
                .join(".codeloop/generations/001-generate/prompt.md")
                .is_file()
        );
    }
}
