//! The job lifecycle state machine.

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use colored::Colorize;
use stagehand_common::{Console, JobError, Result};
use stagehand_process::{force_kill, process_exists, run_to_completion, spawn_detached, wait_pid_gone};
use stagehand_proto::JobService;
use tokio::process::Child;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::debug;

use crate::log::JobLog;
use crate::spec::{JobSpec, JobTimings};

/// Exit outcome of one run, published at most once by the background
/// waiter. `status` is only available for processes this supervisor
/// spawned itself; attached-to processes are detected by liveness polling
/// and carry no exit code.
#[derive(Debug, Clone)]
pub struct ExitRecord {
    pub status: Option<i32>,
    pub error: Option<String>,
}

/// Readiness sub-status while attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Unknown,
    Ready,
    NotReady,
}

/// Externally observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachState {
    Detached,
    Attached(Readiness),
}

/// Cached result of the last successful readiness probe.
struct ReadyCache {
    ready: bool,
    refreshed_at: Instant,
}

/// Run-scoped state: everything that exists only between attach and
/// detach. Dropping the run clears the readiness cache and exit state
/// wholesale, which is what keeps the cache from outliving the process it
/// describes.
struct Run {
    pid: u32,
    exit: Arc<OnceLock<ExitRecord>>,
    exited: watch::Receiver<bool>,
    waiter: JoinHandle<()>,
    status: Option<ReadyCache>,
}

/// One supervised external process plus its lifecycle state.
pub struct Job {
    spec: JobSpec,
    timings: JobTimings,
    log: JobLog,
    service: Box<dyn JobService>,
    run: Option<Run>,
    /// Child handle from our own spawn, held until attach resolves the
    /// control pid. If the pids match the child is waited on directly;
    /// otherwise it was a wrapper and only gets reaped.
    spawned: Option<Child>,
    warnings: Vec<String>,
    errors: Vec<String>,
}

impl Job {
    pub fn new(
        spec: JobSpec,
        timings: JobTimings,
        service: Box<dyn JobService>,
        console: Arc<dyn Console>,
    ) -> Self {
        let log = JobLog::new(console, &spec.name, spec.color);
        Self {
            spec,
            timings,
            log,
            service,
            run: None,
            spawned: None,
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn is_attached(&self) -> bool {
        self.run.is_some()
    }

    pub fn pid(&self) -> Option<u32> {
        self.run.as_ref().map(|r| r.pid)
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn state(&self) -> AttachState {
        match &self.run {
            None => AttachState::Detached,
            Some(run) => AttachState::Attached(match &run.status {
                None => Readiness::Unknown,
                Some(cache) if cache.ready => Readiness::Ready,
                Some(_) => Readiness::NotReady,
            }),
        }
    }

    fn record_error(&mut self, msg: String) {
        let stored = self.log.error(&msg);
        self.errors.push(stored);
    }

    /// Render, accumulate and return a structural error.
    fn fail(&mut self, err: JobError) -> JobError {
        self.record_error(err.to_string());
        err
    }

    fn clear_errors_and_warnings(&mut self) {
        self.errors.clear();
        self.warnings.clear();
    }

    /// Attach to an already-running process, retrying up to
    /// `attempt_count` times with a fixed backoff. Any failure past the
    /// retry budget detaches before returning.
    pub async fn attach(&mut self, attempt_count: u32) -> Result<()> {
        if self.run.is_some() {
            self.log.line("Job already attached.");
            return Ok(());
        }
        match self.try_attach(attempt_count).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.stop_if_running_and_detach().await;
                Err(err)
            }
        }
    }

    async fn try_attach(&mut self, attempt_count: u32) -> Result<()> {
        let mut reply = None;
        let mut last_err = None;
        for attempt in 0..attempt_count {
            if attempt > 0 {
                sleep(self.timings.attach_backoff).await;
            }
            match self.service.attach(self.timings.attach_timeout).await {
                Ok(r) => {
                    reply = Some(r);
                    break;
                }
                Err(err) => {
                    if attempt_count > 1 {
                        self.log.line(&format!(
                            "Attach attempt {} (out of {}) failed: {}",
                            attempt + 1,
                            attempt_count,
                            err
                        ));
                    }
                    last_err = Some(err);
                }
            }
        }
        let reply = match reply {
            Some(r) => r,
            None => {
                return Err(last_err
                    .unwrap_or_else(|| JobError::connection(self.service.port(), "no attempts made")))
            }
        };

        if reply.command != self.spec.command_line() {
            let warn = self
                .log
                .warning(&format!("command different than expected:\n{}", reply.command));
            self.warnings.push(warn);
        }

        let pid = reply.pid;
        match process_exists(pid) {
            Ok(true) => {}
            Ok(false) => {
                return Err(JobError::process_not_found(pid, "no such process"));
            }
            Err(err) => return Err(err),
        }

        // If we spawned this process ourselves we can wait on the child
        // handle and capture a real exit status; a wrapper child with a
        // different pid only gets reaped.
        let owned = match self.spawned.take() {
            Some(child) if child.id() == Some(pid) => Some(child),
            Some(mut wrapper) => {
                tokio::spawn(async move {
                    let _ = wrapper.wait().await;
                });
                None
            }
            None => None,
        };

        let exit = Arc::new(OnceLock::new());
        let (exited_tx, exited_rx) = watch::channel(false);
        let waiter = tokio::spawn(wait_for_exit(
            owned,
            pid,
            self.timings.exit_poll_interval,
            Arc::clone(&exit),
            exited_tx,
        ));
        self.run = Some(Run {
            pid,
            exit,
            exited: exited_rx,
            waiter,
            status: None,
        });

        self.log.line(&format!("Process attached. PID: {}", pid));
        self.refresh_status().await;
        Ok(())
    }

    /// Start a fresh process: optional build step, detached spawn, then
    /// attach with a larger retry budget to ride out slow startup.
    pub async fn start(&mut self) -> Result<()> {
        if self.run.is_some() {
            self.log.line("Job already attached.");
            return Ok(());
        }
        self.clear_errors_and_warnings();

        if let Some(build) = self.spec.build.clone() {
            self.log.line("Building job...");
            let output = run_to_completion(&build.command, &build.args).await;
            match output {
                Ok(out) => {
                    for line in &out.lines {
                        self.log.line(line);
                    }
                    if !out.success {
                        return Err(self.fail(JobError::build(format!(
                            "{} exited with failure",
                            build.command
                        ))));
                    }
                }
                Err(err) => return Err(self.fail(err)),
            }
        }

        self.log
            .line(&format!("Starting job...\n{}", self.spec.command_line()));
        match spawn_detached(&self.spec.command, &self.spec.spawn_args()) {
            Ok(child) => self.spawned = Some(child),
            Err(err) => return Err(self.fail(err)),
        }

        sleep(self.timings.settle_delay).await;
        self.log.line("Job started. Attaching...");
        let attempts = self.timings.start_attach_attempts;
        match self.attach(attempts).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.record_error(format!("attach: {}", err));
                Err(err)
            }
        }
    }

    /// Fast path for an already-running process, falling back to a fresh
    /// start on any attach failure.
    pub async fn attach_or_start(&mut self) -> Result<()> {
        if self.run.is_some() {
            self.log.line("Job already attached.");
            return Ok(());
        }

        self.clear_errors_and_warnings();
        self.log.line("Trying to attach to an already running job...");
        match self.attach(1).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.log.line(&format!(
                    "Unable to attach to an already running job: {}.",
                    err
                ));
                self.start().await
            }
        }
    }

    /// Stop-then-start when attached, otherwise attach-or-start.
    pub async fn restart_or_attach(&mut self) -> Result<()> {
        if self.run.is_some() {
            self.stop_if_running_and_detach().await;
            self.start().await
        } else {
            self.attach_or_start().await
        }
    }

    /// Fails when no run is active; otherwise a full stop-and-detach.
    pub async fn stop(&mut self) -> Result<()> {
        if self.run.is_none() {
            return Err(JobError::NotAttached);
        }
        self.stop_if_running_and_detach().await;
        Ok(())
    }

    /// Graceful-then-forceful shutdown, then detach.
    ///
    /// Two independently bounded phases: a quit request with its own wait
    /// budget, then a SIGKILL with a separate wait budget. Whatever the
    /// outcome, all run-scoped state is cleared before returning; a process
    /// that survives both phases is marked abandoned rather than retried.
    pub async fn stop_if_running_and_detach(&mut self) {
        if let Some(run) = self.run.take() {
            let Run {
                pid,
                exit,
                mut exited,
                waiter,
                ..
            } = run;

            if exit.get().is_none() {
                self.log
                    .line("Sending Quit request to gracefully stop the job...");
                match self.service.quit(self.timings.quit_timeout).await {
                    Err(err) => {
                        self.record_error(format!("quit: {}", err));
                    }
                    Ok(()) => {
                        self.log.line(
                            "Quit request accepted. Waiting for the process to terminate...",
                        );
                        match timeout(self.timings.graceful_wait, exited.wait_for(|e| *e)).await {
                            Ok(Ok(_)) => {}
                            _ => self.log.line("Timed out waiting for process to terminate."),
                        }
                    }
                }
            }

            if exit.get().is_none() {
                self.log
                    .line("Forcefully quitting with SIGKILL and waiting for the process to terminate...");
                match force_kill(pid) {
                    Err(err) => {
                        self.record_error(format!("SIGKILL: {}", err));
                    }
                    Ok(()) => {
                        match timeout(self.timings.kill_wait, exited.wait_for(|e| *e)).await {
                            Ok(Ok(_)) => {}
                            _ => self.log.line("Timed out waiting for process to terminate."),
                        }
                    }
                }
            }

            match exit.get() {
                Some(record) => {
                    match record.status {
                        Some(code) => self
                            .log
                            .line(&format!("Process PID {} exited with {}.", pid, code)),
                        None => self.log.line(&format!("Process PID {} exited.", pid)),
                    }
                    if let Some(err) = &record.error {
                        self.record_error(format!("process wait: {}", err));
                    }
                }
                None => {
                    self.record_error(JobError::Abandoned.to_string());
                }
            }
            waiter.abort();
        }

        // A spawn that never reached attach leaves a wrapper child behind;
        // reap it without killing it.
        if let Some(mut child) = self.spawned.take() {
            tokio::spawn(async move {
                let _ = child.wait().await;
            });
        }

        if let Err(err) = self.service.close().await {
            self.record_error(format!("close connection: {}", err));
        }
        self.warnings.clear();
    }

    /// Refresh the readiness cache.
    ///
    /// Detects an exit record first: a process that died without a quit
    /// request is an unexpected exit, which detaches and records an error.
    /// Otherwise probes only when the cache is stale (absent, not-ready, or
    /// past its TTL); probe failures clear the cache and log without
    /// detaching.
    pub async fn refresh_status(&mut self) {
        if self.run.is_none() {
            return;
        }

        let exited = self
            .run
            .as_ref()
            .map(|r| r.exit.get().is_some())
            .unwrap_or(false);
        if exited {
            self.stop_if_running_and_detach().await;
            self.record_error(JobError::UnexpectedExit.to_string());
            return;
        }

        let stale = {
            let run = self.run.as_ref().unwrap();
            match &run.status {
                None => true,
                Some(cache) => {
                    !cache.ready || cache.refreshed_at.elapsed() > self.timings.status_ttl
                }
            }
        };
        if !stale {
            return;
        }

        match self.service.status(self.timings.status_timeout).await {
            Ok(report) => {
                if let Some(run) = self.run.as_mut() {
                    run.status = Some(ReadyCache {
                        ready: report.ready,
                        refreshed_at: Instant::now(),
                    });
                }
            }
            Err(err) => {
                if let Some(run) = self.run.as_mut() {
                    run.status = None;
                }
                self.log.error(&format!("status: {}", err));
            }
        }
    }

    /// Render a multi-line description of the job's state. Pure projection;
    /// no state is touched.
    pub fn describe(&self) {
        let mut b = String::from("\n\n");
        match &self.run {
            None => b.push_str("    Status: not attached\n"),
            Some(run) => {
                match &run.status {
                    None => b.push_str("    Status: attached, unknown\n"),
                    Some(cache) if cache.ready => b.push_str("    Status: attached, ready\n"),
                    Some(_) => b.push_str("    Status: attached, not ready\n"),
                }
                b.push_str(&format!("    PID:    {}\n", run.pid));
            }
        }
        b.push_str(&format!("    Port:   {}\n", self.service.port()));
        b.push_str(&format!("    Command: {}\n", self.spec.command_line()));
        for warn in &self.warnings {
            b.push_str(&format!("    {} {}\n", "Warning:".yellow(), warn));
        }
        for err in &self.errors {
            b.push_str(&format!("    {} {}\n", "Error:".red(), err));
        }
        b.push('\n');
        self.log.line(&b);
    }

    /// One-glance colored summary: the job name plus a single state marker.
    pub fn summary(&self) -> String {
        let mut b = format!("\x1b[38;5;{}m{}\x1b[0m", self.spec.color, self.spec.name);
        if !self.warnings.is_empty() {
            b.push('*');
        }
        b.push(' ');
        let marker = if !self.errors.is_empty() {
            "X".red().to_string()
        } else {
            match self.state() {
                AttachState::Detached | AttachState::Attached(Readiness::Unknown) => {
                    "?".bright_black().to_string()
                }
                AttachState::Attached(Readiness::Ready) => "O".green().to_string(),
                AttachState::Attached(Readiness::NotReady) => "N".yellow().to_string(),
            }
        };
        b.push_str(&marker);
        b
    }
}

/// Background exit waiter: waits for the process to terminate, publishes
/// the exit record exactly once, then signals the exit event. Single
/// writer; the record is never overwritten within a run.
async fn wait_for_exit(
    owned: Option<Child>,
    pid: u32,
    poll: Duration,
    cell: Arc<OnceLock<ExitRecord>>,
    exited_tx: watch::Sender<bool>,
) {
    let record = match owned {
        Some(mut child) => match child.wait().await {
            Ok(status) => ExitRecord {
                status: status.code(),
                error: None,
            },
            Err(err) => ExitRecord {
                status: None,
                error: Some(err.to_string()),
            },
        },
        None => match wait_pid_gone(pid, poll).await {
            Ok(()) => ExitRecord {
                status: None,
                error: None,
            },
            Err(err) => ExitRecord {
                status: None,
                error: Some(err.to_string()),
            },
        },
    };
    debug!("process {} exited: {:?}", pid, record);
    let _ = cell.set(record);
    let _ = exited_tx.send(true);
}
