use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use stagehand_common::{spawn_line_reader, Console, StdoutConsole};
use stagehand_launcher::{Launcher, LauncherConfig};

/// Stagehand - local process supervisor for a multi-service development
/// environment.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (YAML)
    #[arg(short, long, value_name = "FILE")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    initialize_logging(args.debug);

    let mut config = LauncherConfig::load_from_file(&args.config)?;
    config.resolve_executables()?;
    info!("loaded configuration for {} jobs", config.jobs.len());

    let console: Arc<dyn Console> = Arc::new(StdoutConsole);
    let jobs = config.into_jobs(Arc::clone(&console));

    let mut launcher = Launcher::new(jobs, console);
    let lines = spawn_line_reader();
    launcher.repl(lines).await;

    Ok(())
}

fn initialize_logging(debug: bool) {
    let level = if debug { "debug" } else { "warn" };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .init();
}
