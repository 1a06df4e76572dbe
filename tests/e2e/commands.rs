//! Named external commands through the public Lobby API

#![cfg(unix)]

use std::time::Duration;

use weblobby_core::{Error, Event};

use crate::{pump_for, pump_until, test_lobby};

fn exited(events: &[Event], name: &str) -> bool {
    events
        .iter()
        .any(|e| matches!(e, Event::ProcessExited { process_id, .. } if process_id == name))
}

#[tokio::test]
async fn test_missing_executable_posts_nothing() {
    let mut lobby = test_lobby(None);

    let err = lobby
        .run_command("build", "make-weblobby-missing", Vec::<&str>::new())
        .unwrap_err();

    assert!(matches!(err, Error::Spawn { .. }));
    assert!(!lobby.supervisor().is_registered("build"));
    assert!(pump_for(&mut lobby, Duration::from_millis(200))
        .await
        .is_empty());
}

#[tokio::test]
async fn test_output_precedes_exit_for_each_process() {
    let mut lobby = test_lobby(None);

    lobby
        .run_command("a", "sh", ["-c", "for i in 1 2 3 4 5; do echo a$i; done"])
        .unwrap();
    lobby
        .run_command("b", "sh", ["-c", "for i in 1 2 3 4 5; do echo b$i 1>&2; done"])
        .unwrap();

    let events = pump_until(&mut lobby, |evs| exited(evs, "a") && exited(evs, "b")).await;

    for name in ["a", "b"] {
        let positions: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| e.process_id() == Some(name))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(positions.len(), 6, "five lines and one exit for {name}");
        let last = positions[positions.len() - 1];
        assert!(matches!(events[last], Event::ProcessExited { .. }));
    }
    assert!(lobby.supervisor().is_empty());
}

#[tokio::test]
async fn test_duplicate_run_then_kill_frees_name() {
    let mut lobby = test_lobby(None);

    lobby.run_command("spring", "sleep", ["30"]).unwrap();
    lobby.run_command("spring", "sleep", ["30"]).unwrap();
    assert_eq!(lobby.supervisor().len(), 1);

    assert!(lobby.kill_command("spring"));
    assert!(!lobby.kill_command("spring"));

    // The name is free again right away
    lobby
        .run_command("spring", "sh", ["-c", "echo second"])
        .unwrap();
    let events = pump_until(&mut lobby, |evs| {
        evs.iter()
            .any(|e| *e == Event::output_line("spring", "second"))
    })
    .await;
    assert!(events.contains(&Event::output_line("spring", "second")));
}
