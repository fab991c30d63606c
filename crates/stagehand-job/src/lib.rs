//! # Stagehand Job
//!
//! One supervised external process and its lifecycle state machine:
//! attach-to-existing, start-new (with optional build step), readiness
//! caching, graceful-then-forceful shutdown, and diagnostic accumulation.
//!
//! A [`Job`] goes Detached → Attaching → Attached → Detached. One "run"
//! spans attach/start to detach and owns the resolved pid, the adapter
//! connection, the readiness cache, and a background exit waiter that
//! publishes the exit record exactly once.

pub mod job;
pub mod log;
pub mod spec;

pub use job::{AttachState, ExitRecord, Job, Readiness};
pub use log::JobLog;
pub use spec::{BuildStep, JobSpec, JobTimings};
