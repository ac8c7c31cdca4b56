//! Console formatting for received test events
//!
//! Provides plain and JSON line formats.

use std::io::Write;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

use crate::dispatcher::TestRunListener;
use crate::models::{Event, EventKind, Summary};

/// Output format options
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Plain,
    Json,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "plain" | "text" => Some(OutputFormat::Plain),
            "json" => Some(OutputFormat::Json),
            _ => None,
        }
    }
}

/// Event formatter
pub struct EventFormatter {
    format: OutputFormat,
    colorize: bool,
}

impl EventFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    /// Format one event as a single line. `passed` tells a `TEST_ENDED`
    /// apart for a test that reported no failure or error. Returns `None`
    /// for events with nothing to show.
    pub fn format_event(&self, event: &Event, passed: bool) -> Option<String> {
        match self.format {
            OutputFormat::Json => serde_json::to_string(event).ok(),
            OutputFormat::Plain => self.format_plain(event, passed),
        }
    }

    fn format_plain(&self, event: &Event, passed: bool) -> Option<String> {
        let line = match event.kind() {
            EventKind::RunStarted => format!("Run {} started", event.correlation_id()),
            EventKind::RunEnded { summary, .. } => {
                format!("Run finished: {}", self.format_summary(summary))
            }
            EventKind::RunStopped { summary, .. } => {
                format!("Run stopped: {}", self.format_summary(summary))
            }
            EventKind::SuiteStarted { name } => format!("\n{name}"),
            EventKind::SuiteEnded { name, summary } => {
                format!("{name}: {}", self.format_summary(summary))
            }
            EventKind::TestStarted { .. } | EventKind::RunStop => return None,
            EventKind::TestFailure { name, error } => {
                format!("  {} {name}: {}", self.status("✗ FAIL", 31), error.message)
            }
            EventKind::TestError { name, error } => {
                format!("  {} {name}: {error}", self.status("! ERROR", 31))
            }
            EventKind::TestEnded { name } => {
                if !passed {
                    return None;
                }
                format!("  {} {name}", self.status("✓ PASS", 32))
            }
        };
        Some(line)
    }

    /// Format a summary, highlighting counts of failures and errors
    pub fn format_summary(&self, summary: &Summary) -> String {
        let faults = summary.failure_count + summary.error_count;
        let text = summary.to_string();
        if self.colorize && faults > 0 {
            format!("\x1b[31m{text}\x1b[0m")
        } else {
            text
        }
    }

    fn status(&self, label: &str, color: u8) -> String {
        if self.colorize {
            format!("\x1b[{color}m{label}\x1b[0m")
        } else {
            label.to_string()
        }
    }
}

impl Default for EventFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Plain)
    }
}

/// Prints every dispatched event, one line at a time
pub struct ConsoleListener {
    formatter: EventFormatter,
    out: Mutex<Box<dyn Write + Send>>,
    faulted: Mutex<bool>,
}

impl ConsoleListener {
    pub fn new(formatter: EventFormatter, out: Box<dyn Write + Send>) -> Self {
        Self {
            formatter,
            out: Mutex::new(out),
            faulted: Mutex::new(false),
        }
    }

    pub fn stdout(format: OutputFormat) -> Self {
        Self::new(EventFormatter::new(format), Box::new(std::io::stdout()))
    }

    fn print(&self, event: &Event) {
        let passed = {
            let mut faulted = self.faulted.lock().unwrap_or_else(PoisonError::into_inner);
            match event.kind() {
                EventKind::TestStarted { .. } => {
                    *faulted = false;
                    true
                }
                EventKind::TestFailure { .. } | EventKind::TestError { .. } => {
                    *faulted = true;
                    false
                }
                _ => !*faulted,
            }
        };

        let Some(line) = self.formatter.format_event(event, passed) else {
            return;
        };
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(out, "{line}").and_then(|_| out.flush()) {
            debug!("Failed to print {}: {}", event.event_type(), e);
        }
    }
}

impl TestRunListener for ConsoleListener {
    fn on_run_started(&self, event: &Event) {
        self.print(event);
    }

    fn on_run_ended(&self, event: &Event) {
        self.print(event);
    }

    fn on_run_stopped(&self, event: &Event) {
        self.print(event);
    }

    fn on_suite_started(&self, event: &Event) {
        self.print(event);
    }

    fn on_suite_ended(&self, event: &Event) {
        self.print(event);
    }

    fn on_test_started(&self, event: &Event) {
        self.print(event);
    }

    fn on_test_ended(&self, event: &Event) {
        self.print(event);
    }

    fn on_test_failure(&self, event: &Event) {
        self.print(event);
    }

    fn on_test_error(&self, event: &Event) {
        self.print(event);
    }
}
