//! Runner configuration and output types.

use chrono::{DateTime, Utc};

/// Output line from a task body.
#[derive(Debug, Clone)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub content: String,
    pub line_number: u32,
    pub timestamp: DateTime<Utc>,
}

/// Output stream type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub fn is_stderr(&self) -> bool {
        matches!(self, OutputStream::Stderr)
    }
}

/// Configuration for task execution.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Overrides the task's `timeout_minutes` when set.
    pub timeout_seconds: Option<u64>,
    /// Publish every output line as a `JobOutput` event.
    pub publish_output: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: None,
            publish_output: true,
        }
    }
}

impl RunnerConfig {
    pub(crate) fn effective_timeout(&self, timeout_minutes: u32) -> u64 {
        self.timeout_seconds
            .unwrap_or(u64::from(timeout_minutes) * 60)
    }
}
