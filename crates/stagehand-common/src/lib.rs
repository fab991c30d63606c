//! # Stagehand Common
//!
//! Shared foundations for the stagehand supervisor: the error taxonomy used
//! across every crate and the operator console abstraction that all
//! human-facing output is rendered through.

pub mod console;
pub mod errors;

pub use console::{spawn_line_reader, Console, MemoryConsole, StdoutConsole};
pub use errors::{join_errors, JobError, Result};
