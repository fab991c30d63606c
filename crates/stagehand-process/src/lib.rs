//! # Stagehand Process
//!
//! Low-level process primitives for the supervisor:
//! - pid liveness checking and exit polling
//! - detached process spawning
//! - forceful termination
//! - synchronous build-step execution with captured output

pub mod check;
pub mod spawn;
pub mod terminate;

pub use check::{process_exists, wait_pid_gone};
pub use spawn::{run_to_completion, spawn_detached, CommandOutput};
pub use terminate::force_kill;
