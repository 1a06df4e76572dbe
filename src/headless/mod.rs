//! Headless mode - NDJSON event output
//!
//! The binary has no UI of its own. Every lobby event is written to stdout as
//! one JSON object per line, and lines read from stdin become commands. This
//! makes weblobby scriptable and testable without a front end.
//!
//! # Event Format
//!
//! Events are output as NDJSON (newline-delimited JSON), one event per line.
//! Each event has an "event" field indicating its type, along with
//! event-specific data, an `alert` flag and a millisecond `timestamp`.
//!
//! # Example Output
//!
//! ```json
//! {"event":"started","host":"lobby.springrts.com","port":8200,"timestamp":1704700001000}
//! {"event":"network_line","text":"TASSERVER 0.38 * 8201 0","alert":false,"timestamp":1704700001200}
//! {"event":"process_exited","process_id":"spring","code":0,"alert":false,"timestamp":1704700003000}
//! ```

pub mod commands;
pub mod runner;

use std::io::{self, Write};

use chrono::Utc;
use serde::Serialize;
use tracing::error;

use weblobby_app::EventHandler;
use weblobby_core::{Event, Severity};

/// Records emitted by the headless runner itself
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HeadlessEvent {
    /// Runner is ready for stdin commands
    Started {
        host: String,
        port: u16,
        timestamp: i64,
    },

    /// A stdin command could not be carried out
    CommandRejected {
        command: String,
        reason: String,
        timestamp: i64,
    },

    /// Result of a query command such as `/ls-files` or `/tail`
    Reply {
        command: String,
        output: String,
        timestamp: i64,
    },

    /// Runner is shutting down
    Stopped { timestamp: i64 },
}

impl HeadlessEvent {
    pub fn started(host: &str, port: u16) -> Self {
        Self::Started {
            host: host.to_string(),
            port,
            timestamp: now(),
        }
    }

    pub fn command_rejected(command: &str, reason: impl ToString) -> Self {
        Self::CommandRejected {
            command: command.to_string(),
            reason: reason.to_string(),
            timestamp: now(),
        }
    }

    pub fn reply(command: &str, output: impl Into<String>) -> Self {
        Self::Reply {
            command: command.to_string(),
            output: output.into(),
            timestamp: now(),
        }
    }

    pub fn stopped() -> Self {
        Self::Stopped { timestamp: now() }
    }
}

/// A lobby event as written to the output stream
#[derive(Debug, Serialize)]
pub struct EventRecord<'a> {
    #[serde(flatten)]
    pub event: &'a Event,
    pub alert: bool,
    pub timestamp: i64,
}

impl<'a> EventRecord<'a> {
    pub fn new(event: &'a Event) -> Self {
        Self {
            event,
            alert: event.severity() == Severity::Alert,
            timestamp: now(),
        }
    }
}

/// Get current timestamp in milliseconds
fn now() -> i64 {
    Utc::now().timestamp_millis()
}

/// Writes events as NDJSON, flushing after every line
pub struct NdjsonWriter<W: Write> {
    out: W,
}

impl NdjsonWriter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> NdjsonWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn emit<T: Serialize>(&mut self, record: &T) {
        let json = match serde_json::to_string(record) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize headless event: {}", e);
                return;
            }
        };

        if let Err(e) = writeln!(self.out, "{}", json) {
            error!("Failed to write headless event: {}", e);
            return;
        }

        // Flush to ensure immediate output
        if let Err(e) = self.out.flush() {
            error!("Failed to flush headless output: {}", e);
        }
    }
}

impl<W: Write> EventHandler for NdjsonWriter<W> {
    fn handle_event(&mut self, event: &Event) {
        self.emit(&EventRecord::new(event));
    }

    fn on_shutdown(&mut self) {
        self.emit(&HeadlessEvent::stopped());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weblobby_core::LogLevel;

    fn lines(writer: NdjsonWriter<Vec<u8>>) -> Vec<serde_json::Value> {
        String::from_utf8(writer.into_inner())
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).expect("invalid JSON"))
            .collect()
    }

    #[test]
    fn test_network_line_record() {
        let mut writer = NdjsonWriter::new(Vec::new());
        writer.handle_event(&Event::network_line("PONG"));

        let value = &lines(writer)[0];
        assert_eq!(value["event"], "network_line");
        assert_eq!(value["text"], "PONG");
        assert_eq!(value["alert"], false);
        assert!(value["timestamp"].is_number());
    }

    #[test]
    fn test_alerts_are_flagged() {
        let mut writer = NdjsonWriter::new(Vec::new());
        writer.handle_event(&Event::network_error("connection closed by server"));
        writer.handle_event(&Event::log(LogLevel::Error, "Creating folders failed"));
        writer.handle_event(&Event::log(LogLevel::Warning, "socket is not open"));

        let values = lines(writer);
        assert_eq!(values[0]["event"], "network_error");
        assert_eq!(values[0]["alert"], true);
        assert_eq!(values[1]["level"], "error");
        assert_eq!(values[1]["alert"], true);
        assert_eq!(values[2]["alert"], false);
    }

    #[test]
    fn test_process_exited_record() {
        let mut writer = NdjsonWriter::new(Vec::new());
        writer.handle_event(&Event::ProcessExited {
            process_id: "spring".to_string(),
            code: Some(0),
        });

        let value = &lines(writer)[0];
        assert_eq!(value["event"], "process_exited");
        assert_eq!(value["process_id"], "spring");
        assert_eq!(value["code"], 0);
    }

    #[test]
    fn test_runner_records() {
        let mut writer = NdjsonWriter::new(Vec::new());
        writer.emit(&HeadlessEvent::started("lobby.springrts.com", 8200));
        writer.emit(&HeadlessEvent::command_rejected("/kill x", "no such command"));
        writer.emit(&HeadlessEvent::reply("/ls-dirs /srv", "games||maps"));
        writer.on_shutdown();

        let values = lines(writer);
        assert_eq!(values[0]["event"], "started");
        assert_eq!(values[0]["port"], 8200);
        assert_eq!(values[1]["event"], "command_rejected");
        assert_eq!(values[1]["reason"], "no such command");
        assert_eq!(values[2]["event"], "reply");
        assert_eq!(values[2]["output"], "games||maps");
        assert_eq!(values[3]["event"], "stopped");
    }
}
