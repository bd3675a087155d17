//! Generate, execute, and repair code fragments.
//!
//! Given a task signature (`question -> answer`), the crate asks a code
//! generator for a program, runs it in a persistent interpreter session, and on
//! failure hands the broken code and its error back to the generator for a
//! bounded number of repair attempts. The layout keeps a strict separation:
//!
//! - **[`core`]**: Pure logic (descriptors, code extraction, import checks).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting collaborators (interpreter sessions, the Codex
//!   CLI, config and artifact files), behind traits so tests can script them.
//!
//! [`execution`] and [`repair`] coordinate core logic with those collaborators.

pub mod core;
pub mod execution;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod repair;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
