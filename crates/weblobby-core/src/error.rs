//! Application error types with rich context

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Application error types organized by layer/domain
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ─────────────────────────────────────────────────────────────
    // Lobby Connection Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Could not resolve host {host}: {message}")]
    Resolution { host: String, message: String },

    #[error("Could not connect to lobby server {target}: {message}")]
    Connection { target: String, message: String },

    #[error("Could not read data from lobby server: {message}")]
    Read { message: String },

    #[error("Could not send data to lobby server: {message}")]
    Send { message: String },

    // ─────────────────────────────────────────────────────────────
    // Process Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Cannot start command {name}: {reason}")]
    Spawn { name: String, reason: String },

    // ─────────────────────────────────────────────────────────────
    // Download Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Can't download {url}: {message}")]
    Transport { url: String, message: String },

    #[error("Filesystem error at {path}: {message}")]
    Filesystem { path: PathBuf, message: String },

    // ─────────────────────────────────────────────────────────────
    // Background Job Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Job {id} is already running")]
    NotReady { id: String },

    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn resolution(host: impl Into<String>, message: impl ToString) -> Self {
        Self::Resolution {
            host: host.into(),
            message: message.to_string(),
        }
    }

    pub fn connection(target: impl Into<String>, message: impl ToString) -> Self {
        Self::Connection {
            target: target.into(),
            message: message.to_string(),
        }
    }

    pub fn read(message: impl ToString) -> Self {
        Self::Read {
            message: message.to_string(),
        }
    }

    pub fn send(message: impl ToString) -> Self {
        Self::Send {
            message: message.to_string(),
        }
    }

    pub fn spawn(name: impl Into<String>, reason: impl ToString) -> Self {
        Self::Spawn {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn transport(url: impl Into<String>, message: impl ToString) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.to_string(),
        }
    }

    pub fn filesystem(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Filesystem {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn not_ready(id: impl Into<String>) -> Self {
        Self::NotReady { id: id.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Check if this is a recoverable error
    ///
    /// Recoverable errors leave the failing component usable: the caller may
    /// simply retry (reconnect, re-send, re-download, start the job later).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Resolution { .. }
                | Error::Connection { .. }
                | Error::Read { .. }
                | Error::Send { .. }
                | Error::Transport { .. }
                | Error::NotReady { .. }
        )
    }

    /// Check if this error disables the feature that raised it
    ///
    /// Never process-fatal: the caller reports it at error severity and keeps running.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Spawn { .. } | Error::Filesystem { .. } | Error::Config { .. }
        )
    }
}
