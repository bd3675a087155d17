//! Deterministic, pure logic shared by the repair loop.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod descriptor;
pub mod extract;
pub mod imports;
pub mod signature;
pub mod types;
