//! Forceful process termination.

use stagehand_common::{JobError, Result};
use tracing::debug;

/// Send SIGKILL to the given pid.
///
/// Only the forceful path lives here; graceful shutdown goes through the
/// managed process's own control protocol, never through signals.
pub fn force_kill(pid: u32) -> Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    debug!("sending SIGKILL to pid {}", pid);
    kill(Pid::from_raw(pid as i32), Signal::SIGKILL)
        .map_err(|e| JobError::process_not_found(pid, e.to_string()))
}
