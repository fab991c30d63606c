//! # Stagehand Launcher
//!
//! Owns the ordered collection of jobs and everything the operator touches:
//! index-addressed dispatch, parallel fan-out with joined partial failures,
//! the interactive REPL, the periodic status refresh, and the YAML
//! configuration the job list is built from.

pub mod config;
pub mod launcher;

pub use config::{BuildConfig, JobConfig, LauncherConfig, Protocol};
pub use launcher::Launcher;
