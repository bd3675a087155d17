//! Loop configuration stored in `codeloop.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Default file name looked up in the working directory.
pub const CONFIG_FILE: &str = "codeloop.toml";

/// Repair loop configuration (TOML).
///
/// Missing fields take the defaults below, so an empty file is valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoopConfig {
    /// Regeneration attempts allowed after the initial generation.
    pub max_iters: u32,

    /// Wall-clock budget for each code execution in seconds.
    pub exec_timeout_secs: u64,

    /// Top-level modules generated code may import. `None` disables the check.
    pub import_allowlist: Option<Vec<String>>,

    pub python: PythonConfig,

    pub generator: GeneratorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PythonConfig {
    /// Interpreter command (e.g. `["python3"]` or `["uv", "run", "python"]`).
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Command prefix for the Codex CLI; flags for schema and output are appended.
    pub command: Vec<String>,

    /// Per-call wall-clock budget in seconds.
    pub timeout_secs: u64,

    /// Truncate captured generator stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Truncate each prompt input value beyond this many bytes.
    pub prompt_value_limit_bytes: usize,

    /// Directory (relative to the working directory) for prompts, schemas and logs.
    pub state_dir: String,
}

impl Default for PythonConfig {
    fn default() -> Self {
        Self {
            command: vec!["python3".to_string()],
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            command: vec!["codex".to_string(), "exec".to_string()],
            timeout_secs: 10 * 60,
            output_limit_bytes: 100_000,
            prompt_value_limit_bytes: 20_000,
            state_dir: ".codeloop".to_string(),
        }
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iters: 3,
            exec_timeout_secs: 30,
            import_allowlist: None,
            python: PythonConfig::default(),
            generator: GeneratorConfig::default(),
        }
    }
}

impl LoopConfig {
    pub fn validate(&self) -> Result<()> {
        if self.exec_timeout_secs == 0 {
            return Err(anyhow!("exec_timeout_secs must be > 0"));
        }
        if self.python.command.is_empty() || self.python.command[0].trim().is_empty() {
            return Err(anyhow!("python.command must be a non-empty array"));
        }
        if self.generator.command.is_empty() || self.generator.command[0].trim().is_empty() {
            return Err(anyhow!("generator.command must be a non-empty array"));
        }
        if self.generator.timeout_secs == 0 {
            return Err(anyhow!("generator.timeout_secs must be > 0"));
        }
        if self.generator.output_limit_bytes == 0 {
            return Err(anyhow!("generator.output_limit_bytes must be > 0"));
        }
        if self.generator.prompt_value_limit_bytes == 0 {
            return Err(anyhow!("generator.prompt_value_limit_bytes must be > 0"));
        }
        Ok(())
    }

    pub fn exec_timeout(&self) -> Duration {
        Duration::from_secs(self.exec_timeout_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `LoopConfig::default()`.
pub fn load_config(path: &Path) -> Result<LoopConfig> {
    if !path.exists() {
        let cfg = LoopConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: LoopConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &LoopConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let tmp_path = path.with_extension("toml.tmp");
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, LoopConfig::default());
        assert_eq!(cfg.max_iters, 3);
        assert_eq!(cfg.exec_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested/codeloop.toml");
        let cfg = LoopConfig {
            max_iters: 5,
            import_allowlist: Some(vec!["math".to_string()]),
            ..LoopConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        assert_eq!(load_config(&path).expect("load"), cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("codeloop.toml");
        fs::write(&path, "max_iters = 1\n[python]\ncommand = [\"python3.12\"]\n").expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_iters, 1);
        assert_eq!(cfg.python.command, vec!["python3.12".to_string()]);
        assert_eq!(cfg.generator, GeneratorConfig::default());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("codeloop.toml");
        fs::write(&path, "exec_timeout_secs = 0\n").expect("write");

        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("exec_timeout_secs must be > 0"));
    }
}
