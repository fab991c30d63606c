//! The capability set required of every managed process.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stagehand_common::Result;

/// Reply to an attach request: the process identifies itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobAttach {
    pub pid: u32,
    pub command: String,
}

/// Reply to a readiness probe. `ready = false` is a successful probe, not
/// an error; transport failures surface as connection errors instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusReport {
    pub ready: bool,
}

/// Client-side view of one managed process's control endpoint.
///
/// Every call carries its own explicit timeout; implementations must never
/// block unboundedly on the network.
#[async_trait]
pub trait JobService: Send + Sync {
    /// Contact an already-running process and ask it to identify itself.
    /// Fails with a connection error if nothing is listening or the process
    /// does not respond within `timeout`.
    async fn attach(&self, timeout: Duration) -> Result<JobAttach>;

    /// Lightweight readiness probe.
    async fn status(&self, timeout: Duration) -> Result<JobStatusReport>;

    /// Ask the process to begin its own graceful shutdown. Does not wait
    /// for the process to exit.
    async fn quit(&self, timeout: Duration) -> Result<()>;

    /// Release any connection resources held by the adapter. Idempotent.
    async fn close(&self) -> Result<()>;

    /// The configured endpoint port, for diagnostics only.
    fn port(&self) -> u16;
}
