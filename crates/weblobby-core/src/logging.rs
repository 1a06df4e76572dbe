//! Logging configuration using tracing
//!
//! Records go to a daily-rolling file. Records at or above a threshold are also
//! forwarded to the consumer as [`Event::LogMessage`] through a [`BridgeLayer`],
//! which is how errors reach the UI as alerts.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tracing::field::{Field, Visit};
use tracing::{Event as TracingEvent, Level, Subscriber};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::bridge::EventPoster;
use crate::error::{Error, Result};
use crate::events::{Event, LogLevel};

const LOG_FILE_NAME: &str = "weblobby.log";

/// Options for [`init`]
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Raise the default filter from `info` to `debug`
    pub debug: bool,
    /// Override the log directory (defaults to the platform data dir)
    pub log_dir: Option<PathBuf>,
    /// Forward records at or above [`BridgeLayer`]'s threshold to the consumer
    pub forward_to: Option<EventPoster>,
}

/// Initialize the logging subsystem
///
/// Logs are written to `~/.local/share/weblobby/logs/` unless overridden.
/// Log level is controlled by `WEBLOBBY_LOG` environment variable.
///
/// # Examples
/// ```bash
/// WEBLOBBY_LOG=debug weblobby
/// WEBLOBBY_LOG=weblobby_daemon=trace weblobby
/// ```
///
/// # Errors
///
/// [`Error::Filesystem`] if the log directory cannot be created. Logging is
/// then unavailable; the caller decides how to continue.
pub fn init(options: LogOptions) -> Result<PathBuf> {
    let log_dir = match options.log_dir {
        Some(dir) => dir,
        None => get_log_directory(),
    };
    ensure_log_directory(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_NAME);

    let env_filter = EnvFilter::try_from_env("WEBLOBBY_LOG").unwrap_or_else(|_| {
        if options.debug {
            EnvFilter::new("weblobby=debug,weblobby_core=debug,weblobby_daemon=debug,weblobby_app=debug,info")
        } else {
            EnvFilter::new("weblobby=info,weblobby_daemon=info,weblobby_app=info,warn")
        }
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_target(true)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true)
                .with_timer(fmt::time::ChronoLocal::new(
                    "%Y-%m-%d %H:%M:%S%.3f".to_string(),
                )),
        )
        .with(options.forward_to.map(BridgeLayer::new))
        .init();

    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("weblobby starting");
    tracing::info!("Log directory: {}", log_dir.display());
    tracing::info!("═══════════════════════════════════════════════════════");

    Ok(log_dir)
}

/// Fallback used when the log directory is unusable: plain stderr output.
pub fn init_stderr(debug: bool, forward_to: Option<EventPoster>) {
    let env_filter = EnvFilter::try_from_env("WEBLOBBY_LOG")
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "warn" }));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .with(forward_to.map(BridgeLayer::new))
        .init();
}

/// Get the log directory path
pub fn get_log_directory() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("weblobby").join("logs")
}

fn ensure_log_directory(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .map_err(|e| Error::filesystem(dir, format!("creating log directory failed: {e}")))
}

// ─────────────────────────────────────────────────────────
// Bridge Layer
// ─────────────────────────────────────────────────────────

/// Forwards tracing records to the consumer as [`Event::LogMessage`]
#[derive(Debug, Clone)]
pub struct BridgeLayer {
    poster: EventPoster,
    threshold: Level,
}

impl BridgeLayer {
    /// Forward WARN and ERROR records
    pub fn new(poster: EventPoster) -> Self {
        Self {
            poster,
            threshold: Level::WARN,
        }
    }

    pub fn with_threshold(mut self, threshold: Level) -> Self {
        self.threshold = threshold;
        self
    }
}

impl<S: Subscriber> Layer<S> for BridgeLayer {
    fn on_event(&self, event: &TracingEvent<'_>, _ctx: Context<'_, S>) {
        let level = event.metadata().level();
        // Lower verbosity compares greater: ERROR < WARN < INFO in tracing's ordering.
        if *level > self.threshold {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.poster
            .post(Event::log(LogLevel::from(level), visitor.finish()));
    }
}

/// Collects the `message` field followed by any structured fields
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields.trim_start().to_string()
        } else {
            format!("{}{}", self.message, self.fields)
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}
