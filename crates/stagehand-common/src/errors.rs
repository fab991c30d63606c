//! Error types for the stagehand supervisor.
//!
//! The taxonomy distinguishes recoverable connection failures (retried with
//! bounded attempt counts) from structural failures (build, spawn, bounds
//! violations) that propagate immediately, and from configuration errors
//! that are fatal to the whole program.

use thiserror::Error;

/// Result type alias for supervisor operations.
pub type Result<T> = std::result::Result<T, JobError>;

/// Main error type for job and launcher operations.
#[derive(Debug, Clone, Error)]
pub enum JobError {
    /// Dial/call failure or timeout against a managed process endpoint.
    #[error("connection error on port {port}: {reason}")]
    Connection { port: u16, reason: String },

    /// A lifecycle command was issued against a job with no live run.
    #[error("job not attached")]
    NotAttached,

    /// An index outside the launcher's job list bounds.
    #[error("invalid job index: {0}")]
    InvalidIndex(usize),

    /// The pre-spawn build step failed.
    #[error("build: {0}")]
    Build(String),

    /// The process could not be spawned.
    #[error("starting job: {0}")]
    Spawn(String),

    /// The pid reported by the managed process is not alive locally.
    #[error("can't find process: {pid}: {reason}")]
    ProcessNotFound { pid: u32, reason: String },

    /// The process terminated without a quit request having been issued.
    #[error("process exited unexpectedly")]
    UnexpectedExit,

    /// The process survived both the graceful and the forceful phase.
    #[error("couldn't terminate process; abandoned")]
    Abandoned,

    /// Invalid or unusable static configuration; fatal to the program.
    #[error("configuration: {0}")]
    Configuration(String),

    /// Joined failures from a batch fan-out; per-index failures never abort
    /// the remaining indices, they are collected here instead.
    #[error("{}", format_batch(.0))]
    Batch(Vec<JobError>),

    /// Failure in the supervisor itself (task panic, closed channel).
    #[error("internal: {0}")]
    Internal(String),
}

impl JobError {
    pub fn connection(port: u16, reason: impl Into<String>) -> Self {
        Self::Connection {
            port,
            reason: reason.into(),
        }
    }

    pub fn build(reason: impl Into<String>) -> Self {
        Self::Build(reason.into())
    }

    pub fn spawn(reason: impl Into<String>) -> Self {
        Self::Spawn(reason.into())
    }

    pub fn process_not_found(pid: u32, reason: impl Into<String>) -> Self {
        Self::ProcessNotFound {
            pid,
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal(reason.into())
    }
}

fn format_batch(errors: &[JobError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Join a list of errors into a single result.
///
/// Empty input is success, a single error is returned as-is, and multiple
/// errors are wrapped in [`JobError::Batch`].
pub fn join_errors(mut errors: Vec<JobError>) -> Result<()> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(JobError::Batch(errors)),
    }
}
