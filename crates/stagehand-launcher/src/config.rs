//! Launcher configuration.
//!
//! The job list is static: loaded once from a YAML file at startup,
//! validated eagerly, and read-only afterwards. Configuration problems are
//! the only errors fatal to the whole program.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use stagehand_common::Console;
use stagehand_job::{BuildStep, Job, JobSpec, JobTimings};
use stagehand_proto::{GrpcJobService, JobService, RestJobService};

/// Control-protocol binding of one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Grpc,
    Http,
}

/// Optional pre-spawn build step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// One job entry in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    #[serde(default = "default_color")]
    pub color: u8,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildConfig>,
    pub port: u16,
    #[serde(default)]
    pub protocol: Protocol,
}

/// Top-level configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LauncherConfig {
    pub jobs: Vec<JobConfig>,
}

fn default_color() -> u8 {
    244
}

impl LauncherConfig {
    /// Load configuration from a YAML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        Self::load_from_string(&content)
    }

    /// Load configuration from a YAML string.
    pub fn load_from_string(content: &str) -> Result<Self> {
        let config: LauncherConfig =
            serde_yaml::from_str(content).context("Failed to parse YAML configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Structural validation: names, ports, bounds. Does not touch the
    /// filesystem; see [`LauncherConfig::resolve_executables`].
    pub fn validate(&self) -> Result<()> {
        if self.jobs.is_empty() {
            bail!("configuration defines no jobs");
        }
        for job in &self.jobs {
            if job.name.is_empty() {
                bail!("job with empty name");
            }
            if job.port == 0 {
                bail!("job '{}' has port 0", job.name);
            }
            if job.command.is_empty() {
                bail!("job '{}' has no command", job.name);
            }
        }
        for (i, job) in self.jobs.iter().enumerate() {
            if self.jobs[..i].iter().any(|other| other.name == job.name) {
                bail!("duplicate job name '{}'", job.name);
            }
        }
        Ok(())
    }

    /// Resolve every job command to an absolute path through `PATH`.
    ///
    /// A missing executable at this point is a configuration-time error and
    /// fatal to the program.
    pub fn resolve_executables(&mut self) -> Result<()> {
        for job in &mut self.jobs {
            let resolved = which::which(&job.command).with_context(|| {
                format!(
                    "failed to find executable for job '{}': {}",
                    job.name, job.command
                )
            })?;
            job.command = resolved.to_string_lossy().into_owned();
        }
        Ok(())
    }

    /// Build the job list, selecting each job's protocol binding. Jobs and
    /// the launcher never branch on the binding afterwards.
    pub fn into_jobs(self, console: Arc<dyn Console>) -> Vec<Job> {
        self.jobs
            .into_iter()
            .map(|jc| {
                let service: Box<dyn JobService> = match jc.protocol {
                    Protocol::Grpc => Box::new(GrpcJobService::new(jc.port)),
                    Protocol::Http => Box::new(RestJobService::new(jc.port)),
                };
                let spec = JobSpec {
                    name: jc.name,
                    color: jc.color,
                    command: jc.command,
                    args: jc.args,
                    build: jc.build.map(|b| BuildStep {
                        command: b.command,
                        args: b.args,
                    }),
                    port: jc.port,
                };
                Job::new(spec, JobTimings::default(), service, Arc::clone(&console))
            })
            .collect()
    }
}
