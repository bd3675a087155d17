//! Exit codes of the `codeloop` binary.

/// Command succeeded; `run` printed an answer.
pub const OK: i32 = 0;
/// Invalid signature, inputs or config, generator failure, or other errors.
pub const INVALID: i32 = 1;
/// `codeloop run` used its whole repair budget without a successful execution.
pub const NO_ANSWER: i32 = 2;
