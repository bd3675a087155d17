//! Per-attempt artifacts written by `codeloop run --log-dir`.
//!
//! Layout: `<dir>/<index>-<mode>/{meta.json,response.txt,code.py}` plus a
//! top-level `outcome.json`. Independent of tracing output.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::types::AttemptRecord;
use crate::repair::RepairOutcome;

#[derive(Debug, Serialize)]
struct OutcomeMeta<'a> {
    answered: bool,
    value: Option<&'a str>,
    last_error: Option<&'a str>,
    attempts: usize,
}

/// Directory of one attempt under `dir`.
pub fn attempt_dir(dir: &Path, record: &AttemptRecord) -> PathBuf {
    dir.join(format!("{}-{}", record.index, record.mode))
}

/// Write every attempt of `outcome` plus a summary into `dir`.
pub fn write_attempts(dir: &Path, outcome: &RepairOutcome) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("create log dir {}", dir.display()))?;

    for record in outcome.attempts() {
        let attempt = attempt_dir(dir, record);
        fs::create_dir_all(&attempt)
            .with_context(|| format!("create attempt dir {}", attempt.display()))?;
        write_json(&attempt.join("meta.json"), record)?;
        write_text(&attempt.join("response.txt"), &record.raw_response)?;
        write_text(&attempt.join("code.py"), &record.code)?;
    }

    write_json(
        &dir.join("outcome.json"),
        &OutcomeMeta {
            answered: outcome.value().is_some(),
            value: outcome.value(),
            last_error: outcome.last_error(),
            attempts: outcome.attempts().len(),
        },
    )
}

fn write_text(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(value)?;
    buf.push('\n');
    write_text(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ExecutionResult, Mode};

    fn record(index: u32, mode: Mode, result: ExecutionResult) -> AttemptRecord {
        AttemptRecord {
            index,
            mode,
            raw_response: "x = y".to_string(),
            reasoning: None,
            code: "x = y\nx".to_string(),
            extraction_error: None,
            result,
        }
    }

    #[test]
    fn writes_one_directory_per_attempt() {
        let temp = tempfile::tempdir().expect("tempdir");
        let outcome = RepairOutcome::Answered {
            value: "2".to_string(),
            attempts: vec![
                record(0, Mode::Generate, ExecutionResult::Failure("NameError".to_string())),
                record(1, Mode::Regenerate, ExecutionResult::Success("2".to_string())),
            ],
        };

        write_attempts(temp.path(), &outcome).expect("write");

        assert!(temp.path().join("0-generate/meta.json").is_file());
        assert!(temp.path().join("1-regenerate/code.py").is_file());
        let summary = fs::read_to_string(temp.path().join("outcome.json")).expect("read");
        let summary: serde_json::Value = serde_json::from_str(&summary).expect("json");
        assert_eq!(summary["answered"], true);
        assert_eq!(summary["value"], "2");
        assert_eq!(summary["attempts"], 2);
    }
}
