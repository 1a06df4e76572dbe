//! Headless mode runner - main event loop without a UI
//!
//! Reads commands from stdin on a dedicated thread, applies them to the
//! [`Lobby`], and writes every delivered event to stdout as NDJSON.

use std::io::Write;
use std::path::PathBuf;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use weblobby_app::files::{self, join_listing};
use weblobby_app::{EventHandler, Lobby, Settings};
use weblobby_core::prelude::Result;
use weblobby_core::{Event, EventBridge};

use super::commands::{parse_command, StdinCommand};
use super::{HeadlessEvent, NdjsonWriter};

/// Run in headless mode until `/quit` or Ctrl-C.
///
/// `bridge` may already be wired into logging so warnings and errors show up
/// in the output stream. `/save-config` writes to `config_file`.
pub async fn run_headless(
    settings: Settings,
    config_file: PathBuf,
    bridge: EventBridge,
    auto_connect: bool,
) -> Result<()> {
    info!("═══════════════════════════════════════════════════════");
    info!("weblobby starting in HEADLESS mode");
    info!(
        "Lobby server: {}:{}",
        settings.network.host, settings.network.port
    );
    info!("═══════════════════════════════════════════════════════");

    let mut lobby =
        Lobby::with_bridge(settings, Handle::current(), bridge)?.with_config_file(config_file);
    let mut out = NdjsonWriter::stdout();

    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    std::thread::Builder::new()
        .name("weblobby-stdin".to_string())
        .spawn(move || stdin_reader_blocking(cmd_tx))?;

    let network = &lobby.settings().network;
    out.emit(&HeadlessEvent::started(&network.host, network.port));
    if auto_connect {
        lobby.connect();
    }

    headless_event_loop(&mut lobby, cmd_rx, &mut out).await;

    lobby.shutdown(&mut out);
    info!("weblobby headless mode exiting");
    Ok(())
}

enum Wake {
    Command(Option<String>),
    Event(Option<Event>),
    Interrupt,
}

/// Main headless event loop
pub async fn headless_event_loop<W: Write>(
    lobby: &mut Lobby,
    mut cmd_rx: mpsc::Receiver<String>,
    out: &mut NdjsonWriter<W>,
) {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut stdin_open = true;

    loop {
        let wake = tokio::select! {
            line = cmd_rx.recv(), if stdin_open => Wake::Command(line),
            event = lobby.next_event() => Wake::Event(event),
            _ = &mut ctrl_c => Wake::Interrupt,
        };

        match wake {
            Wake::Command(Some(line)) => {
                if !apply_line(lobby, &line, out) {
                    info!("Quit requested");
                    break;
                }
            }
            Wake::Command(None) => {
                // Keep serving events; only /quit or Ctrl-C end the loop
                info!("stdin closed");
                stdin_open = false;
            }
            Wake::Event(Some(event)) => out.handle_event(&event),
            Wake::Event(None) => break,
            Wake::Interrupt => {
                info!("Interrupted");
                break;
            }
        }
    }
}

/// Apply one stdin line. Returns `false` when the runner should stop.
pub fn apply_line<W: Write>(lobby: &mut Lobby, line: &str, out: &mut NdjsonWriter<W>) -> bool {
    let command = match parse_command(line) {
        Ok(Some(command)) => command,
        Ok(None) => return true,
        Err(reason) => {
            out.emit(&HeadlessEvent::command_rejected(line, reason));
            return true;
        }
    };

    match command {
        StdinCommand::Quit => return false,
        StdinCommand::Connect(None) => lobby.connect(),
        StdinCommand::Connect(Some((host, port))) => lobby.connect_to(&host, port),
        StdinCommand::Disconnect => lobby.disconnect(),
        StdinCommand::Send(message) => lobby.send(&message),
        StdinCommand::Run {
            name,
            program,
            args,
        } => {
            if let Err(e) = lobby.run_command(&name, &program, &args) {
                out.emit(&HeadlessEvent::command_rejected(line, e));
            }
        }
        StdinCommand::Kill(name) => {
            if !lobby.kill_command(&name) {
                out.emit(&HeadlessEvent::command_rejected(line, "no such command"));
            }
        }
        StdinCommand::Fetch {
            job_id,
            url,
            target,
        } => {
            if let Err(e) = lobby.download(&job_id, &url, target) {
                out.emit(&HeadlessEvent::command_rejected(line, e));
            }
        }
        StdinCommand::ListDirs(dir) => {
            report(out, line, files::list_dirs(&dir).map(|names| Some(join_listing(&names))))
        }
        StdinCommand::ListFiles(dir) => {
            report(out, line, files::list_files(&dir).map(|names| Some(join_listing(&names))))
        }
        StdinCommand::Tail { path, lines } => {
            report(out, line, files::read_tail(&path, lines).map(Some))
        }
        StdinCommand::CreateScript { path, script } => {
            report(out, line, files::create_script(&path, &script).map(|()| None))
        }
        StdinCommand::Append { path, line: text } => {
            report(out, line, files::append_line(&path, &text).map(|()| None))
        }
        StdinCommand::UiKeys(path) => report(out, line, files::create_ui_keys(&path).map(|_| None)),
        StdinCommand::DeleteSpringSettings(path) => {
            report(out, line, files::delete_spring_settings(&path).map(|()| None))
        }
        StdinCommand::SaveConfig => report(out, line, lobby.save_settings().map(|()| None)),
    }
    true
}

/// Emit a reply for query output, or the rejection reason
fn report<W: Write>(out: &mut NdjsonWriter<W>, line: &str, result: Result<Option<String>>) {
    match result {
        Ok(Some(output)) => out.emit(&HeadlessEvent::reply(line, output)),
        Ok(None) => {}
        Err(e) => out.emit(&HeadlessEvent::command_rejected(line, e)),
    }
}

/// Forward stdin lines to the event loop (blocking, own thread)
fn stdin_reader_blocking(cmd_tx: mpsc::Sender<String>) {
    use std::io::BufRead;

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        match line {
            Ok(line) => {
                if cmd_tx.blocking_send(line).is_err() {
                    break;
                }
            }
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                break;
            }
        }
    }

    warn!("Stdin reader exiting");
}
