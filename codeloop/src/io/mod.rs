//! Side-effecting collaborators: interpreter sessions, generator processes,
//! configuration and artifact files.

pub mod attempt_log;
pub mod backend;
pub mod codex;
pub mod config;
pub mod generator;
pub mod process;
pub mod prompt;
pub mod python;
