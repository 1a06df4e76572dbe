//! Event definitions
//!
//! Every producer (the network thread, process reader tasks, job threads and the
//! logging layer) describes what happened as an [`Event`] and posts it to the
//! [`EventBridge`](crate::bridge::EventBridge). Events are moved, never shared.

use serde::Serialize;

// ─────────────────────────────────────────────────────────
// Log Level
// ─────────────────────────────────────────────────────────

/// Severity of a [`Event::LogMessage`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }
}

impl From<&tracing::Level> for LogLevel {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::ERROR => LogLevel::Error,
            tracing::Level::WARN => LogLevel::Warning,
            tracing::Level::INFO => LogLevel::Info,
            _ => LogLevel::Debug,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────
// Event
// ─────────────────────────────────────────────────────────

/// Outcome carried by [`Event::JobResult`]: a value or an error reason.
pub type JobOutcome = std::result::Result<String, String>;

/// One occurrence reported by a producer thread
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// A complete line received from the lobby server, delimiter stripped
    NetworkLine { text: String },

    /// Resolution, connection or read failure of the lobby session
    NetworkError { message: String },

    /// One line of combined stdout/stderr from a supervised process
    ProcessOutputLine { process_id: String, text: String },

    /// A supervised process terminated; always the last event for that run
    ProcessExited {
        process_id: String,
        code: Option<i32>,
    },

    /// Result of a one-shot background job
    JobResult {
        job_id: String,
        kind: String,
        outcome: JobOutcome,
    },

    /// A log record forwarded to the consumer
    LogMessage { level: LogLevel, text: String },
}

/// How the UI layer is expected to surface an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Shown to the user as an alert
    Alert,
    /// Routed to the UI silently (output, log panes)
    Info,
}

impl Event {
    pub fn network_line(text: impl Into<String>) -> Self {
        Event::NetworkLine { text: text.into() }
    }

    pub fn network_error(message: impl ToString) -> Self {
        Event::NetworkError {
            message: message.to_string(),
        }
    }

    pub fn output_line(process_id: impl Into<String>, text: impl Into<String>) -> Self {
        Event::ProcessOutputLine {
            process_id: process_id.into(),
            text: text.into(),
        }
    }

    pub fn log(level: LogLevel, text: impl Into<String>) -> Self {
        Event::LogMessage {
            level,
            text: text.into(),
        }
    }

    /// Short snake_case name of the variant, used in logs and NDJSON output
    pub fn kind(&self) -> &'static str {
        match self {
            Event::NetworkLine { .. } => "network_line",
            Event::NetworkError { .. } => "network_error",
            Event::ProcessOutputLine { .. } => "process_output_line",
            Event::ProcessExited { .. } => "process_exited",
            Event::JobResult { .. } => "job_result",
            Event::LogMessage { .. } => "log_message",
        }
    }

    /// Connection errors and error-level log messages are alerts.
    pub fn severity(&self) -> Severity {
        match self {
            Event::NetworkError { .. } => Severity::Alert,
            Event::LogMessage {
                level: LogLevel::Error,
                ..
            } => Severity::Alert,
            _ => Severity::Info,
        }
    }

    /// Process name for process events
    pub fn process_id(&self) -> Option<&str> {
        match self {
            Event::ProcessOutputLine { process_id, .. } | Event::ProcessExited { process_id, .. } => {
                Some(process_id)
            }
            _ => None,
        }
    }
}
