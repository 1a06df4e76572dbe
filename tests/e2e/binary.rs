//! The weblobby binary driven over stdin/stdout

use std::io::{BufRead, BufReader, Write};
use std::process::{Command, Stdio};

#[test]
fn test_headless_binary_starts_and_quits() {
    let temp = tempfile::tempdir().unwrap();

    let mut child = Command::new(env!("CARGO_BIN_EXE_weblobby"))
        .args(["--no-connect", "--log-dir"])
        .arg(temp.path().join("logs"))
        .env("WEBLOBBY_CONFIG", temp.path().join("config.toml"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    let mut stdin = child.stdin.take().unwrap();
    let mut stdout = BufReader::new(child.stdout.take().unwrap());

    let mut line = String::new();
    stdout.read_line(&mut line).unwrap();
    let started: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(started["event"], "started");
    assert_eq!(started["host"], "lobby.springrts.com");
    assert_eq!(started["port"], 8200);

    writeln!(stdin, "/frobnicate").unwrap();
    let rejected = loop {
        line.clear();
        assert!(stdout.read_line(&mut line).unwrap() > 0, "output ended early");
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        if value["event"] == "command_rejected" {
            break value;
        }
    };
    assert_eq!(rejected["command"], "/frobnicate");

    writeln!(stdin, "/quit").unwrap();
    let status = child.wait().unwrap();
    assert!(status.success());

    let rest: Vec<String> = stdout.lines().map_while(Result::ok).collect();
    assert!(rest.iter().any(|l| l.contains("\"event\":\"stopped\"")));
}
