//! CLI tests for the `codeloop` binary.
//!
//! `run` is exercised end to end with a shell stand-in for `codex exec` and the
//! system `python3`; those tests return early when no interpreter is available.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use codeloop::exit_codes;
use codeloop::io::config::{LoopConfig, load_config};

fn codeloop(dir: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_codeloop"));
    cmd.current_dir(dir).args(args).env_remove("RUST_LOG");
    cmd
}

fn run_with_stdin(mut cmd: Command, stdin: &str) -> Output {
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn codeloop");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(stdin.as_bytes())
        .expect("write stdin");
    child.wait_with_output().expect("wait codeloop")
}

fn python_available() -> bool {
    Command::new("python3")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|status| status.success())
}

#[test]
fn extract_prints_normalized_fragment() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = run_with_stdin(
        codeloop(temp.path(), &["extract"]),
        "Here you go:\n```python\nx = 1 + 1\n```\n---\nExplanation",
    );

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "x = 1 + 1\nx\n");
}

#[test]
fn extract_empty_input_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = run_with_stdin(codeloop(temp.path(), &["extract"]), "```python\n\n```");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Empty code after parsing"));
}

#[test]
fn init_config_writes_defaults_once() {
    let temp = tempfile::tempdir().expect("tempdir");

    let status = codeloop(temp.path(), &["init-config"])
        .status()
        .expect("init-config");
    assert_eq!(status.code(), Some(exit_codes::OK));
    let cfg = load_config(&temp.path().join("codeloop.toml")).expect("load");
    assert_eq!(cfg, LoopConfig::default());

    let status = codeloop(temp.path(), &["init-config"])
        .stderr(Stdio::null())
        .status()
        .expect("init-config again");
    assert_eq!(status.code(), Some(exit_codes::INVALID));

    let status = codeloop(temp.path(), &["init-config", "--force"])
        .status()
        .expect("init-config --force");
    assert_eq!(status.code(), Some(exit_codes::OK));
}

#[test]
fn run_rejects_multiple_outputs() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = codeloop(
        temp.path(),
        &["run", "--signature", "question -> answer, detail", "--input", "question=q"],
    )
    .output()
    .expect("run");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("only one output field supported"));
}

/// Write a stand-in for `codex exec` that answers every call with `code`.
#[cfg(unix)]
fn write_fake_codex(dir: &Path, code: &str) {
    let answer = serde_json::json!({ "reasoning": "scripted", "generated_code": code });
    let script = format!(
        "#!/bin/sh\nout=\"\"\nwhile [ $# -gt 0 ]; do\n  if [ \"$1\" = \"--output-last-message\" ]; then out=\"$2\"; shift; fi\n  shift\ndone\ncat > /dev/null\ncat > \"$out\" <<'JSON'\n{answer}\nJSON\n"
    );
    fs::write(dir.join("fake-codex.sh"), script).expect("write script");

    let config = format!(
        "max_iters = 1\nexec_timeout_secs = 10\n\n[generator]\ncommand = [\"sh\", \"{}\"]\ntimeout_secs = 30\n",
        dir.join("fake-codex.sh").display()
    );
    fs::write(dir.join("codeloop.toml"), config).expect("write config");
}

#[cfg(unix)]
#[test]
fn run_prints_answer_from_generated_code() {
    if !python_available() {
        return;
    }
    let temp = tempfile::tempdir().expect("tempdir");
    write_fake_codex(temp.path(), "x = 1 + 1");

    let output = codeloop(
        temp.path(),
        &["run", "--signature", "question -> answer", "--input", "question=1 + 1?"],
    )
    .output()
    .expect("run");

    assert_eq!(
        output.status.code(),
        Some(exit_codes::OK),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(String::from_utf8_lossy(&output.stdout), "2\n");
    assert!(
        temp.path()
            .join(".codeloop/generations/001-generate/prompt.md")
            .is_file()
    );
}

#[cfg(unix)]
#[test]
fn run_exhaustion_exits_with_no_answer() {
    if !python_available() {
        return;
    }
    let temp = tempfile::tempdir().expect("tempdir");
    write_fake_codex(temp.path(), "x = undefined_name");

    let output = codeloop(
        temp.path(),
        &[
            "run",
            "--signature",
            "question -> answer",
            "--input",
            "question=q",
            "--log-dir",
            "attempts",
        ],
    )
    .output()
    .expect("run");

    assert_eq!(output.status.code(), Some(exit_codes::NO_ANSWER));
    assert!(String::from_utf8_lossy(&output.stderr).contains("NameError"));

    let attempts = temp.path().join("attempts");
    assert!(attempts.join("0-generate/code.py").is_file());
    assert!(attempts.join("1-regenerate/meta.json").is_file());
    let summary = fs::read_to_string(attempts.join("outcome.json")).expect("outcome");
    assert!(summary.contains("\"answered\": false"));
}
