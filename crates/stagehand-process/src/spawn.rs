//! Process spawning and synchronous command execution.

use std::process::Stdio;

use stagehand_common::{JobError, Result};
use tokio::process::{Child, Command};
use tracing::debug;

/// Captured result of a command run to completion.
#[derive(Debug)]
pub struct CommandOutput {
    pub success: bool,
    /// Interleaved stdout + stderr, split into lines for prefixed logging.
    pub lines: Vec<String>,
}

/// Spawn a process detached from the supervisor's terminal.
///
/// The child gets its own process group and null stdio, so it neither
/// receives the operator's Ctrl+C nor scribbles over the console. It is
/// not killed when the supervisor exits; jobs outlive their launcher by
/// design and are reclaimed by attaching again.
pub fn spawn_detached(executable: &str, args: &[String]) -> Result<Child> {
    let mut cmd = Command::new(executable);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    #[cfg(unix)]
    cmd.process_group(0);

    let child = cmd
        .spawn()
        .map_err(|e| JobError::spawn(format!("{}: {}", executable, e)))?;
    debug!("spawned {} (pid {:?})", executable, child.id());
    Ok(child)
}

/// Run a command to completion, capturing its combined output.
///
/// Used for pre-spawn build steps, which run synchronously: the caller
/// fails fast on a non-zero exit and never proceeds to spawn.
pub async fn run_to_completion(executable: &str, args: &[String]) -> Result<CommandOutput> {
    let output = Command::new(executable)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| JobError::build(format!("{}: {}", executable, e)))?;

    let mut lines: Vec<String> = Vec::new();
    for stream in [&output.stdout, &output.stderr] {
        lines.extend(
            String::from_utf8_lossy(stream)
                .lines()
                .map(str::to_string),
        );
    }

    Ok(CommandOutput {
        success: output.status.success(),
        lines,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::process_exists;
    use std::time::Duration;

    #[tokio::test]
    async fn spawn_detached_produces_live_process() {
        let child = spawn_detached("sleep", &["5".to_string()]).unwrap();
        let pid = child.id().unwrap();
        assert!(process_exists(pid).unwrap());

        // Clean up: not our test subject beyond liveness.
        crate::terminate::force_kill(pid).unwrap();
    }

    #[tokio::test]
    async fn spawn_detached_missing_executable_fails() {
        let err = spawn_detached("/nonexistent/stagehand-no-such-binary", &[]).unwrap_err();
        assert!(matches!(err, stagehand_common::JobError::Spawn(_)));
    }

    #[tokio::test]
    async fn run_to_completion_captures_output() {
        let out = run_to_completion("echo", &["hello build".to_string()])
            .await
            .unwrap();
        assert!(out.success);
        assert_eq!(out.lines, vec!["hello build"]);
    }

    #[tokio::test]
    async fn run_to_completion_reports_failure() {
        let out = run_to_completion("false", &[]).await.unwrap();
        assert!(!out.success);
    }

    #[tokio::test]
    async fn run_to_completion_missing_tool_is_build_error() {
        let err = run_to_completion("/nonexistent/stagehand-no-such-tool", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, stagehand_common::JobError::Build(_)));
        // Sanity: failure is reported quickly, not after a hang.
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}
