//! Static job description and timing profile.

use std::time::Duration;

/// Optional pre-spawn build step, run to completion before the process is
/// spawned.
#[derive(Debug, Clone)]
pub struct BuildStep {
    pub command: String,
    pub args: Vec<String>,
}

/// Static description of one supervised process, fixed at construction.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub name: String,
    /// xterm-256 color index used for the job's console prefix and summary.
    pub color: u8,
    pub command: String,
    pub args: Vec<String>,
    pub build: Option<BuildStep>,
    /// Control-endpoint port; appended to the spawn arguments.
    pub port: u16,
}

impl JobSpec {
    /// Arguments the process is actually spawned with: the configured args
    /// plus its control port.
    pub fn spawn_args(&self) -> Vec<String> {
        let mut args = self.args.clone();
        args.push(format!("--port={}", self.port));
        args
    }

    /// The command line this job is expected to run as. Compared against
    /// the line the process reports about itself on attach.
    pub fn command_line(&self) -> String {
        let mut line = self.command.clone();
        for arg in self.spawn_args() {
            line.push(' ');
            line.push_str(&arg);
        }
        line
    }
}

/// Timing profile for lifecycle operations.
///
/// The defaults are the production values; tests shrink them to keep the
/// suite fast.
#[derive(Debug, Clone)]
pub struct JobTimings {
    /// Deadline for a single attach RPC.
    pub attach_timeout: Duration,
    /// Backoff between attach attempts.
    pub attach_backoff: Duration,
    /// Attach attempt budget after a fresh spawn.
    pub start_attach_attempts: u32,
    /// Delay after spawning before the first attach attempt.
    pub settle_delay: Duration,
    /// Deadline for the graceful quit RPC.
    pub quit_timeout: Duration,
    /// How long to wait for exit after an accepted quit.
    pub graceful_wait: Duration,
    /// How long to wait for exit after a forceful kill. Independent of the
    /// graceful budget; the two phases never share a deadline.
    pub kill_wait: Duration,
    /// Deadline for a readiness probe.
    pub status_timeout: Duration,
    /// Age beyond which a ready result is considered stale.
    pub status_ttl: Duration,
    /// Liveness polling interval for processes we did not spawn.
    pub exit_poll_interval: Duration,
}

impl Default for JobTimings {
    fn default() -> Self {
        Self {
            attach_timeout: Duration::from_secs(5),
            attach_backoff: Duration::from_secs(1),
            start_attach_attempts: 5,
            settle_delay: Duration::from_secs(1),
            quit_timeout: Duration::from_secs(5),
            graceful_wait: Duration::from_secs(5),
            kill_wait: Duration::from_secs(5),
            status_timeout: Duration::from_secs(5),
            status_ttl: Duration::from_secs(20),
            exit_poll_interval: Duration::from_millis(100),
        }
    }
}
