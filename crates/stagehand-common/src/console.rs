//! Operator console abstraction.
//!
//! All human-facing output from jobs and the launcher flows through the
//! [`Console`] trait so that the core never writes to stdout directly.
//! Terminal ergonomics beyond `render` (tab focusing and the like) are
//! deliberately reduced to an optional no-op hook.

use std::io::BufRead;
use std::sync::Mutex;

use tokio::sync::mpsc;

/// Sink for operator-facing output lines.
pub trait Console: Send + Sync {
    /// Render one line of text to the operator.
    fn render(&self, line: &str);

    /// Bring the operator's terminal to the foreground, if the
    /// implementation knows how. Default is a no-op.
    fn focus(&self) {}
}

/// Console that writes timestamped lines to stdout.
pub struct StdoutConsole;

impl Console for StdoutConsole {
    fn render(&self, line: &str) {
        let stamp = chrono::Local::now().format("%Y/%m/%d %H:%M:%S");
        println!("{} {}", stamp, line);
    }
}

/// Console that captures rendered lines in memory.
///
/// Used by tests to assert on operator output without a terminal.
#[derive(Default)]
pub struct MemoryConsole {
    lines: Mutex<Vec<String>>,
}

impl MemoryConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything rendered so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    /// True if any rendered line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().unwrap().iter().any(|l| l.contains(needle))
    }
}

impl Console for MemoryConsole {
    fn render(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }
}

/// Spawn a thread that reads operator input lines from stdin and feeds them
/// into a channel.
///
/// Stdin reads are blocking, so they run on a dedicated OS thread rather
/// than a tokio task; the channel closes when stdin reaches EOF.
pub fn spawn_line_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(8);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_console_captures_lines() {
        let console = MemoryConsole::new();
        console.render("first");
        console.render("second line");
        assert_eq!(console.lines(), vec!["first", "second line"]);
        assert!(console.contains("second"));
        assert!(!console.contains("third"));
    }

    #[test]
    fn focus_defaults_to_noop() {
        let console = MemoryConsole::new();
        console.focus();
        assert!(console.lines().is_empty());
    }
}
