//! weblobby - a lobby client core driven over stdin/stdout
//!
//! This is the binary entry point. All logic lives in the library.

use std::path::PathBuf;

use clap::Parser;
use weblobby_app::config::{config_path, load_settings};
use weblobby_app::Settings;
use weblobby_core::logging::{self, LogOptions};
use weblobby_core::EventBridge;

/// weblobby - lobby session, command runner and downloader
#[derive(Parser, Debug)]
#[command(name = "weblobby", version)]
#[command(about = "Headless lobby client with NDJSON output", long_about = None)]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Lobby server host (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Lobby server port (overrides config)
    #[arg(long)]
    port: Option<u16>,

    /// Do not connect on startup; wait for /connect
    #[arg(long)]
    no_connect: bool,

    /// Debug-level logging
    #[arg(long)]
    debug: bool,

    /// Log every lobby protocol line
    #[arg(long = "debug-net")]
    debug_net: bool,

    /// Log every line of command output
    #[arg(long = "debug-cmd")]
    debug_cmd: bool,

    /// All of the debug switches
    #[arg(long = "debug-all")]
    debug_all: bool,

    /// Write logs here instead of the platform data directory
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,
}

impl Args {
    fn apply(&self, settings: &mut Settings) {
        if let Some(host) = &self.host {
            settings.network.host = host.clone();
        }
        if let Some(port) = self.port {
            settings.network.port = port;
        }

        let logging = &mut settings.logging;
        if self.debug_all {
            logging.enable_all();
        }
        logging.debug |= self.debug;
        logging.debug_network |= self.debug_net;
        logging.debug_commands |= self.debug_cmd;
    }
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    let config = args.config.clone().unwrap_or_else(config_path);
    let mut settings = load_settings(&config);
    args.apply(&mut settings);

    let bridge = EventBridge::new();
    let debug = settings.logging.wants_debug();
    let options = LogOptions {
        debug,
        log_dir: args.log_dir.clone(),
        forward_to: Some(bridge.poster()),
    };
    if let Err(e) = logging::init(options) {
        // Logging to file is unavailable; keep running with stderr output
        eprintln!("weblobby: {e}");
        logging::init_stderr(debug, Some(bridge.poster()));
    }

    weblobby::run_headless(settings, config, bridge, !args.no_connect).await?;
    Ok(())
}
