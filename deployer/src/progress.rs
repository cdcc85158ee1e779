//! Progress reporting

use std::sync::Mutex;

use colored::Colorize;
use deploy_records::StepStatus;

/// A single progress notification
#[derive(Debug, Clone, Copy)]
pub struct ProgressEvent<'a> {
    pub step: &'a str,
    pub status: StepStatus,
    pub details: &'a str,

    /// Raw output line, set for log forwarding events
    pub log_line: Option<&'a str>,
}

/// Receives progress events from the engine.
///
/// Called any number of times per step, possibly from inside nested async
/// operations, so implementations must not block.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent<'_>);
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressEvent<'_>) + Send + Sync,
{
    fn on_progress(&self, event: &ProgressEvent<'_>) {
        self(event)
    }
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn on_progress(&self, _event: &ProgressEvent<'_>) {}
}

/// Prints status lines and indented output to the terminal
#[derive(Debug, Clone)]
pub struct ConsoleSink {
    show_logs: bool,
}

impl ConsoleSink {
    pub fn new(show_logs: bool) -> Self {
        Self { show_logs }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ProgressSink for ConsoleSink {
    fn on_progress(&self, event: &ProgressEvent<'_>) {
        if let Some(line) = event.log_line {
            if self.show_logs {
                println!("    {}", line.dimmed());
            }
            return;
        }

        let badge = match event.status {
            StepStatus::Running => "[ .. ]".cyan(),
            StepStatus::Completed => "[ ok ]".green(),
            StepStatus::Warning => "[warn]".yellow(),
            StepStatus::Failed => "[fail]".red().bold(),
        };
        println!("{} {:<20} {}", badge, event.step.bold(), event.details);
    }
}

/// Owned copy of an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub step: String,
    pub status: StepStatus,
    pub details: String,
    pub log_line: Option<String>,
}

/// Keeps every event it receives
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Status events for one step, log lines excluded
    pub fn statuses(&self, step: &str) -> Vec<StepStatus> {
        self.events()
            .into_iter()
            .filter(|e| e.step == step && e.log_line.is_none())
            .map(|e| e.status)
            .collect()
    }
}

impl ProgressSink for RecordingSink {
    fn on_progress(&self, event: &ProgressEvent<'_>) {
        if let Ok(mut events) = self.events.lock() {
            events.push(RecordedEvent {
                step: event.step.to_string(),
                status: event.status,
                details: event.details.to_string(),
                log_line: event.log_line.map(str::to_string),
            });
        }
    }
}
