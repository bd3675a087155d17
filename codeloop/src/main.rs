//! `codeloop` command line.
//!
//! `run` answers one task by generating Python with the Codex CLI, executing it
//! in a persistent interpreter and repairing failures. `extract` exposes the
//! fragment normalizer for debugging prompts.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use codeloop::core::descriptor::TaskDescriptor;
use codeloop::core::extract::{ExtractionError, extract};
use codeloop::core::signature::TaskSignature;
use codeloop::core::types::Inputs;
use codeloop::exit_codes;
use codeloop::io::attempt_log::write_attempts;
use codeloop::io::codex::CodexGenerator;
use codeloop::io::config::{CONFIG_FILE, LoopConfig, load_config, write_config};
use codeloop::io::python::PythonSession;
use codeloop::logging;
use codeloop::repair::{RepairConfig, RepairLoop, RepairOutcome};

#[derive(Parser)]
#[command(
    name = "codeloop",
    version,
    about = "Generate Python for a task, run it, and repair failures"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Answer a task and print the value of the generated program.
    Run {
        /// Task signature, e.g. "question -> answer".
        #[arg(short, long)]
        signature: String,
        /// Input value as `name=value`; repeat for each input field.
        #[arg(short, long = "input", value_parser = parse_input)]
        inputs: Vec<(String, String)>,
        /// Config file; defaults apply when it does not exist.
        #[arg(short, long, default_value = CONFIG_FILE)]
        config: PathBuf,
        /// Write per-attempt artifacts into this directory.
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },
    /// Normalize generator output read from stdin and print the fragment.
    Extract,
    /// Write the default config file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
        #[arg(short, long, default_value = CONFIG_FILE)]
        path: PathBuf,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            signature,
            inputs,
            config,
            log_dir,
        } => cmd_run(&signature, inputs, &config, log_dir.as_deref()),
        Command::Extract => cmd_extract(),
        Command::InitConfig { force, path } => cmd_init_config(&path, force),
    }
}

fn cmd_run(
    signature: &str,
    inputs: Vec<(String, String)>,
    config_path: &Path,
    log_dir: Option<&Path>,
) -> Result<i32> {
    let config = load_config(config_path)?;
    let signature = TaskSignature::parse(signature).context("parse signature")?;
    let descriptor = TaskDescriptor::build(signature).context("build task descriptor")?;

    let workdir = std::env::current_dir().context("resolve working directory")?;
    let generator = CodexGenerator::new(&config.generator, &workdir);
    let mut session = PythonSession::new(config.python.command.clone());
    let repair = RepairLoop::new(&descriptor, generator, RepairConfig::from(&config));

    let outcome = repair.forward(&mut session, inputs.into_iter().collect::<Inputs>())?;
    session.shutdown();

    if let Some(dir) = log_dir {
        write_attempts(dir, &outcome)?;
    }
    match outcome {
        RepairOutcome::Answered { value, .. } => {
            println!("{value}");
            Ok(exit_codes::OK)
        }
        RepairOutcome::Exhausted {
            last_error,
            attempts,
        } => {
            eprintln!(
                "no answer after {} attempt(s); last error: {last_error}",
                attempts.len()
            );
            Ok(exit_codes::NO_ANSWER)
        }
    }
}

fn cmd_extract() -> Result<i32> {
    let mut raw = String::new();
    std::io::stdin()
        .read_to_string(&mut raw)
        .context("read stdin")?;
    let extraction = extract(&raw);
    if !extraction.code.is_empty() {
        println!("{}", extraction.code);
    }
    match extraction.error {
        Some(err @ ExtractionError::Empty) => {
            eprintln!("{err}");
            Ok(exit_codes::INVALID)
        }
        Some(err) => {
            eprintln!("{err}");
            Ok(exit_codes::OK)
        }
        None => Ok(exit_codes::OK),
    }
}

fn cmd_init_config(path: &Path, force: bool) -> Result<i32> {
    if !force && path.exists() {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &LoopConfig::default())?;
    println!("{}", path.display());
    Ok(exit_codes::OK)
}

fn parse_input(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected name=value, got `{raw}`")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_input_splits_at_first_equals() {
        assert_eq!(
            parse_input("expr=a == b").expect("parse"),
            ("expr".to_string(), "a == b".to_string())
        );
        assert_eq!(
            parse_input(" question =").expect("parse"),
            ("question".to_string(), String::new())
        );
        assert!(parse_input("novalue").is_err());
        assert!(parse_input("=1").is_err());
    }

    #[test]
    fn cli_accepts_repeated_inputs() {
        let cli = Cli::try_parse_from([
            "codeloop",
            "run",
            "--signature",
            "a, b -> c",
            "--input",
            "a=1",
            "-i",
            "b=2",
        ])
        .expect("parse");
        match cli.command {
            Command::Run { inputs, config, .. } => {
                assert_eq!(inputs.len(), 2);
                assert_eq!(config, PathBuf::from(CONFIG_FILE));
            }
            _ => panic!("expected run"),
        }
    }
}
