//! The launcher: index-addressed batch dispatch and the operator REPL.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use colored::Colorize;
use stagehand_common::{join_errors, Console, JobError, Result};
use stagehand_job::Job;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::debug;

/// Period of the background status refresh.
const STATUS_TICK: Duration = Duration::from_secs(5);

/// An unchanged summary is re-rendered at most this often.
const FORCE_RENDER_INTERVAL: Duration = Duration::from_secs(60);

const HELP: &str = "\n
    h            Show this help message.
    Q            Quit all jobs.
    q <index>    Quit job with the given index.
    s <index>    Start or attach to job with given index.
    r <index>    Restart job with given index.
    d            Describe all jobs.
    d <index>    Describe job with the given index.
    .            Rerun last command.
";

/// Ordered collection of jobs plus the REPL state.
///
/// The job list is read-only after construction. Every job sits behind its
/// own mutex so parallel fan-out serializes lifecycle commands per index
/// while leaving different jobs fully independent.
pub struct Launcher {
    jobs: Vec<Arc<Mutex<Job>>>,
    all_indices: Vec<usize>,
    console: Arc<dyn Console>,
    last_status: String,
    last_render: Option<Instant>,
    last_command: String,
}

impl Launcher {
    pub fn new(jobs: Vec<Job>, console: Arc<dyn Console>) -> Self {
        let jobs: Vec<_> = jobs.into_iter().map(|j| Arc::new(Mutex::new(j))).collect();
        let all_indices = (0..jobs.len()).collect();
        Self {
            jobs,
            all_indices,
            console,
            last_status: String::new(),
            last_render: None,
            last_command: String::new(),
        }
    }

    /// Look up a job by index, with bounds validation.
    pub fn job(&self, index: usize) -> Result<Arc<Mutex<Job>>> {
        self.jobs
            .get(index)
            .cloned()
            .ok_or(JobError::InvalidIndex(index))
    }

    /// Run `f` for each index sequentially, collecting per-index failures
    /// into a combined error. An out-of-range index never aborts the
    /// remaining indices.
    pub async fn each_job<F, Fut>(&self, f: F, indices: &[usize]) -> Result<()>
    where
        F: Fn(Arc<Mutex<Job>>) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut errs = Vec::new();
        for &i in indices {
            match self.job(i) {
                Err(err) => errs.push(err),
                Ok(job) => {
                    if let Err(err) = f(job).await {
                        errs.push(err);
                    }
                }
            }
        }
        join_errors(errs)
    }

    /// Run `f` for each index concurrently, one task per index, joining all
    /// tasks before returning. One job's failure never cancels or blocks
    /// the others; results are combined the same way as [`Self::each_job`].
    pub async fn each_job_parallel<F, Fut>(&self, f: F, indices: &[usize]) -> Result<()>
    where
        F: Fn(Arc<Mutex<Job>>) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let mut errs = Vec::new();
        let mut set = JoinSet::new();
        for &i in indices {
            match self.job(i) {
                Err(err) => errs.push(err),
                Ok(job) => {
                    set.spawn(f(job));
                }
            }
        }
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => errs.push(err),
                Err(join_err) => errs.push(JobError::internal(join_err.to_string())),
            }
        }
        join_errors(errs)
    }

    pub async fn attach_or_start(&self, indices: &[usize]) -> Result<()> {
        let result = self
            .each_job_parallel(
                |job| async move { job.lock().await.attach_or_start().await },
                indices,
            )
            .await;
        self.console.focus();
        result
    }

    pub async fn restart_or_attach(&self, indices: &[usize]) -> Result<()> {
        let result = self
            .each_job_parallel(
                |job| async move { job.lock().await.restart_or_attach().await },
                indices,
            )
            .await;
        self.console.focus();
        result
    }

    pub async fn stop(&self, indices: &[usize]) -> Result<()> {
        self.each_job_parallel(|job| async move { job.lock().await.stop().await }, indices)
            .await
    }

    pub async fn stop_all(&self) -> Result<()> {
        self.stop(&self.all_indices).await
    }

    pub async fn describe(&self, indices: &[usize]) -> Result<()> {
        self.each_job(
            |job| async move {
                job.lock().await.describe();
                Ok(())
            },
            indices,
        )
        .await
    }

    pub async fn describe_all(&self) -> Result<()> {
        self.describe(&self.all_indices).await
    }

    /// Refresh every job's status in parallel, then render the one-line
    /// summary — but only when it changed or the forced re-render period
    /// elapsed, so an unchanged system stays quiet.
    pub async fn print_status(&mut self) {
        let indices = self.all_indices.clone();
        let _ = self
            .each_job_parallel(
                |job| async move {
                    job.lock().await.refresh_status().await;
                    Ok(())
                },
                &indices,
            )
            .await;

        let mut parts = Vec::with_capacity(self.jobs.len());
        for (i, job) in self.jobs.iter().enumerate() {
            parts.push(format!("{}: {}", i, job.lock().await.summary()));
        }
        let status = parts.join(", ");

        let force = self
            .last_render
            .map_or(true, |at| at.elapsed() > FORCE_RENDER_INTERVAL);
        if status != self.last_status || force {
            self.last_status = status.clone();
            self.last_render = Some(Instant::now());
            self.console.render(&status);
        }
    }

    fn render_error(&self, err: &JobError) {
        self.console
            .render(&format!("{} {}", "Error:".red(), err));
    }

    /// Dispatch one operator command line. Returns true when the loop
    /// should exit.
    pub async fn user_command(&mut self, line: &str) -> bool {
        let mut line = line.trim().to_string();
        if line.split_whitespace().next().is_none() {
            return false;
        }

        // "." reruns the last recorded command; it is never recorded
        // itself.
        if line == "." {
            if self.last_command.is_empty() {
                return false;
            }
            line = self.last_command.clone();
        } else {
            self.last_command = line.clone();
        }

        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields[0] {
            "h" if fields.len() == 1 => {
                self.console.render(HELP);
                return false;
            }
            "Q" if fields.len() == 1 => {
                let _ = self.stop_all().await;
                return true;
            }
            "q" if fields.len() == 2 => {
                if let Ok(i) = fields[1].parse::<usize>() {
                    if let Err(err) = self.stop(&[i]).await {
                        self.render_error(&err);
                    }
                    return false;
                }
            }
            "s" if fields.len() == 2 => {
                if let Ok(i) = fields[1].parse::<usize>() {
                    if let Err(err) = self.attach_or_start(&[i]).await {
                        self.render_error(&err);
                    }
                    return false;
                }
            }
            "r" if fields.len() == 2 => {
                if let Ok(i) = fields[1].parse::<usize>() {
                    if let Err(err) = self.restart_or_attach(&[i]).await {
                        self.render_error(&err);
                    }
                    return false;
                }
            }
            "d" if fields.len() == 1 => {
                let _ = self.describe_all().await;
                return false;
            }
            "d" if fields.len() == 2 => {
                if let Ok(i) = fields[1].parse::<usize>() {
                    if let Err(err) = self.describe(&[i]).await {
                        self.render_error(&err);
                    }
                    return false;
                }
            }
            _ => {}
        }
        self.console.render("Unknown command. Type 'h' for help.");
        false
    }

    /// The operator control loop: serializes two event sources, the input
    /// line channel and the periodic status tick. Returns when the
    /// operator quits all jobs or the input channel closes.
    pub async fn repl(&mut self, mut lines: mpsc::Receiver<String>) {
        let indices = self.all_indices.clone();
        if let Err(err) = self.attach_or_start(&indices).await {
            self.render_error(&err);
        }
        let _ = self.describe_all().await;
        self.print_status().await;

        let start = tokio::time::Instant::now() + STATUS_TICK;
        let mut ticker = tokio::time::interval_at(start, STATUS_TICK);
        loop {
            tokio::select! {
                line = lines.recv() => match line {
                    None => {
                        debug!("operator input closed");
                        break;
                    }
                    Some(line) => {
                        if self.user_command(&line).await {
                            break;
                        }
                        // Force the next tick to re-render after any
                        // command.
                        self.last_render = None;
                    }
                },
                _ = ticker.tick() => self.print_status().await,
            }
        }
    }
}
