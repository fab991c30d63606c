//! Per-job prefixed console logging.

use std::sync::Arc;

use colored::Colorize;
use stagehand_common::Console;

/// Console logger carrying a color-coded job prefix.
///
/// Warnings and errors are rendered with a tag and returned as plain text
/// so the job can accumulate them in its diagnostic lists.
#[derive(Clone)]
pub struct JobLog {
    console: Arc<dyn Console>,
    prefix: String,
}

impl JobLog {
    pub fn new(console: Arc<dyn Console>, name: &str, color: u8) -> Self {
        let prefix = format!("[\x1b[38;5;{}m{:>8}\x1b[0m] ", color, name);
        Self { console, prefix }
    }

    pub fn console(&self) -> Arc<dyn Console> {
        Arc::clone(&self.console)
    }

    pub fn line(&self, msg: &str) {
        self.console.render(&format!("{}{}", self.prefix, msg));
    }

    /// Render a tagged warning, returning the plain message for
    /// accumulation.
    pub fn warning(&self, msg: &str) -> String {
        self.console
            .render(&format!("{}{} {}", self.prefix, "Warning:".yellow(), msg));
        msg.to_string()
    }

    /// Render a tagged error, returning the plain message for accumulation.
    pub fn error(&self, msg: &str) -> String {
        self.console
            .render(&format!("{}{} {}", self.prefix, "Error:".red(), msg));
        msg.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagehand_common::MemoryConsole;

    #[test]
    fn lines_carry_the_job_prefix() {
        let console = Arc::new(MemoryConsole::new());
        let log = JobLog::new(console.clone(), "vite", 98);
        log.line("starting");
        let lines = console.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("vite"));
        assert!(lines[0].ends_with("starting"));
    }

    #[test]
    fn warning_returns_plain_message() {
        let console = Arc::new(MemoryConsole::new());
        let log = JobLog::new(console.clone(), "vite", 98);
        let stored = log.warning("command differs");
        assert_eq!(stored, "command differs");
        assert!(console.contains("command differs"));
    }
}
