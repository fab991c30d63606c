//! Process existence checking.

use std::time::Duration;

use stagehand_common::{JobError, Result};

/// Check whether a process with the given pid exists and is running.
///
/// Uses `kill(pid, 0)`: no signal is delivered, but the kernel reports
/// whether the pid is addressable. `EPERM` means the process exists but
/// belongs to someone else, which still counts as alive.
pub fn process_exists(pid: u32) -> Result<bool> {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), None) {
        Ok(_) => Ok(true),
        Err(nix::errno::Errno::ESRCH) => Ok(false),
        Err(nix::errno::Errno::EPERM) => Ok(true),
        Err(e) => Err(JobError::process_not_found(pid, e.to_string())),
    }
}

/// Block until the given pid no longer exists, polling at `interval`.
///
/// This is the exit-detection path for processes the supervisor attached to
/// but did not spawn: they are not our children, so `wait()` is unavailable
/// and liveness polling is the portable alternative. A probe error is
/// returned so the caller can record it in the exit record.
pub async fn wait_pid_gone(pid: u32, interval: Duration) -> Result<()> {
    loop {
        if !process_exists(pid)? {
            return Ok(());
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_process_exists() {
        assert!(process_exists(std::process::id()).unwrap());
    }

    #[test]
    fn init_process_exists() {
        assert!(process_exists(1).unwrap());
    }

    #[tokio::test]
    async fn wait_pid_gone_returns_after_exit() {
        let mut child = tokio::process::Command::new("sleep")
            .arg("0.05")
            .spawn()
            .unwrap();
        let pid = child.id().unwrap();

        // Reap in the background so the pid actually disappears rather than
        // lingering as a zombie.
        tokio::spawn(async move {
            let _ = child.wait().await;
        });

        tokio::time::timeout(
            Duration::from_secs(5),
            wait_pid_gone(pid, Duration::from_millis(10)),
        )
        .await
        .expect("pid should disappear well within the timeout")
        .unwrap();

        assert!(!process_exists(pid).unwrap());
    }
}
