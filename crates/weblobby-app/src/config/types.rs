//! Configuration types

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use weblobby_daemon::{ClientOptions, DownloadOptions};

/// Application settings (config.toml)
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub network: NetworkSettings,

    #[serde(default)]
    pub download: DownloadSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Lobby server endpoint
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NetworkSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "lobby.springrts.com".to_string()
}

fn default_port() -> u16 {
    8200
}

/// Download staging
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DownloadSettings {
    /// Where bodies are staged before replacing the target
    /// (default: `<temp dir>/weblobby_dl`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,

    /// Targets whose path contains this string are made executable
    #[serde(default = "default_executable_marker")]
    pub executable_marker: String,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            scratch_dir: None,
            executable_marker: default_executable_marker(),
        }
    }
}

fn default_executable_marker() -> String {
    "pr-downloader".to_string()
}

impl DownloadSettings {
    pub fn to_options(&self) -> DownloadOptions {
        let defaults = DownloadOptions::default();
        DownloadOptions {
            scratch_dir: self.scratch_dir.clone().unwrap_or(defaults.scratch_dir),
            executable_marker: self.executable_marker.clone(),
        }
    }
}

/// Verbosity switches, also settable from the command line
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct LoggingSettings {
    /// Debug-level logging everywhere
    #[serde(default)]
    pub debug: bool,

    /// Log every lobby protocol line
    #[serde(default)]
    pub debug_network: bool,

    /// Log every line of child process output
    #[serde(default)]
    pub debug_commands: bool,
}

impl LoggingSettings {
    /// Turn on every switch
    pub fn enable_all(&mut self) {
        self.debug = true;
        self.debug_network = true;
        self.debug_commands = true;
    }

    /// Any switch implies debug-level records
    pub fn wants_debug(&self) -> bool {
        self.debug || self.debug_network || self.debug_commands
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            log_traffic: self.debug_network,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.network.host, "lobby.springrts.com");
        assert_eq!(settings.network.port, 8200);
        assert_eq!(settings.download.executable_marker, "pr-downloader");
        assert!(!settings.logging.wants_debug());
    }

    #[test]
    fn test_download_options_fall_back_to_temp_dir() {
        let options = DownloadSettings::default().to_options();
        assert!(options.scratch_dir.ends_with("weblobby_dl"));

        let custom = DownloadSettings {
            scratch_dir: Some(PathBuf::from("/var/tmp/dl")),
            executable_marker: String::new(),
        }
        .to_options();
        assert_eq!(custom.scratch_dir, PathBuf::from("/var/tmp/dl"));
        assert!(custom.executable_marker.is_empty());
    }

    #[test]
    fn test_enable_all_sets_every_switch() {
        let mut logging = LoggingSettings::default();
        logging.enable_all();
        assert!(logging.debug && logging.debug_network && logging.debug_commands);
        assert!(logging.client_options().log_traffic);
    }

    #[test]
    fn test_network_only_implies_debug() {
        let logging = LoggingSettings {
            debug_network: true,
            ..Default::default()
        };
        assert!(logging.wants_debug());
    }
}
