//! Stdin command parsing for headless mode
//!
//! Lines starting with `/` are runner commands; anything else is sent to the
//! lobby server verbatim.
//!
//! ```text
//! /connect [host port]
//! /disconnect
//! /run <name> <program> [args...]
//! /kill <name>
//! /fetch <job-id> <url> <target>
//! /ls-dirs <dir>
//! /ls-files <dir>
//! /tail <file> <lines>
//! /create-script <file> <text...>     (`\n` in text becomes a newline)
//! /append <file> <text...>
//! /uikeys <file>
//! /delete-springsettings <file>
//! /save-config
//! /quit
//! ```

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdinCommand {
    /// Connect to the configured server, or to an explicit endpoint
    Connect(Option<(String, u16)>),
    Disconnect,
    Run {
        name: String,
        program: String,
        args: Vec<String>,
    },
    Kill(String),
    Fetch {
        job_id: String,
        url: String,
        target: PathBuf,
    },
    ListDirs(PathBuf),
    ListFiles(PathBuf),
    Tail {
        path: PathBuf,
        lines: usize,
    },
    CreateScript {
        path: PathBuf,
        script: String,
    },
    Append {
        path: PathBuf,
        line: String,
    },
    UiKeys(PathBuf),
    DeleteSpringSettings(PathBuf),
    SaveConfig,
    Quit,
    /// Raw protocol line for the lobby server
    Send(String),
}

/// Parse one stdin line. `Ok(None)` for blank lines.
pub fn parse_command(line: &str) -> Result<Option<StdinCommand>, String> {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    if trimmed.trim().is_empty() {
        return Ok(None);
    }
    if !trimmed.starts_with('/') {
        return Ok(Some(StdinCommand::Send(trimmed.to_string())));
    }

    let (verb, args) = trimmed
        .split_once(char::is_whitespace)
        .unwrap_or((trimmed, ""));
    let wrong_arguments = || format!("wrong arguments for {verb}");

    // Free text after the path keeps its spacing
    match verb {
        "/create-script" => {
            let (path, text) = path_and_text(args).ok_or_else(wrong_arguments)?;
            return Ok(Some(StdinCommand::CreateScript {
                path,
                script: text.replace("\\n", "\n"),
            }));
        }
        "/append" => {
            let (path, line) = path_and_text(args).ok_or_else(wrong_arguments)?;
            return Ok(Some(StdinCommand::Append { path, line }));
        }
        _ => {}
    }

    let rest: Vec<&str> = args.split_whitespace().collect();
    let command = match (verb, rest.as_slice()) {
        ("/quit" | "/q", []) => StdinCommand::Quit,
        ("/disconnect", []) => StdinCommand::Disconnect,
        ("/connect", []) => StdinCommand::Connect(None),
        ("/connect", [host, port]) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| format!("invalid port: {port}"))?;
            StdinCommand::Connect(Some((host.to_string(), port)))
        }
        ("/run", [name, program, args @ ..]) => StdinCommand::Run {
            name: name.to_string(),
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        },
        ("/kill", [name]) => StdinCommand::Kill(name.to_string()),
        ("/fetch", [job_id, url, target]) => StdinCommand::Fetch {
            job_id: job_id.to_string(),
            url: url.to_string(),
            target: PathBuf::from(target),
        },
        ("/ls-dirs", [dir]) => StdinCommand::ListDirs(PathBuf::from(dir)),
        ("/ls-files", [dir]) => StdinCommand::ListFiles(PathBuf::from(dir)),
        ("/tail", [path, lines]) => StdinCommand::Tail {
            path: PathBuf::from(path),
            lines: lines
                .parse()
                .map_err(|_| format!("invalid line count: {lines}"))?,
        },
        ("/uikeys", [path]) => StdinCommand::UiKeys(PathBuf::from(path)),
        ("/delete-springsettings", [path]) => {
            StdinCommand::DeleteSpringSettings(PathBuf::from(path))
        }
        ("/save-config", []) => StdinCommand::SaveConfig,
        (
            "/quit" | "/q" | "/disconnect" | "/connect" | "/run" | "/kill" | "/fetch" | "/ls-dirs"
            | "/ls-files" | "/tail" | "/uikeys" | "/delete-springsettings" | "/save-config",
            _,
        ) => return Err(wrong_arguments()),
        _ => return Err(format!("unknown command: {verb}")),
    };
    Ok(Some(command))
}

fn path_and_text(args: &str) -> Option<(PathBuf, String)> {
    let (path, text) = args.trim_start().split_once(char::is_whitespace)?;
    Some((PathBuf::from(path), text.to_string()))
}
