//! Conditional downloads run as background jobs

use std::fs;

use weblobby_core::Event;
use weblobby_daemon::test_utils::{hours_ago, MockHttpReply, MockHttpServer};

use crate::{pump_until, test_lobby};

#[tokio::test]
async fn test_not_modified_leaves_target_untouched() {
    let temp = tempfile::tempdir().unwrap();
    let mut lobby = test_lobby(Some(temp.path()));
    let server = MockHttpServer::start(MockHttpReply::conditional(b"remote", hours_ago(24)));

    let target = temp.path().join("y.zip");
    fs::write(&target, b"local copy").unwrap();
    let before = fs::metadata(&target).unwrap().modified().unwrap();

    lobby.download("check", &server.url("/y.zip"), &target).unwrap();

    let events = pump_until(&mut lobby, |evs| !evs.is_empty()).await;
    assert!(matches!(
        &events[0],
        Event::JobResult { outcome: Ok(text), .. } if text.ends_with("is up to date")
    ));
    assert!(server.requests()[0]
        .to_ascii_lowercase()
        .contains("if-modified-since"));
    assert_eq!(fs::read(&target).unwrap(), b"local copy");
    assert_eq!(fs::metadata(&target).unwrap().modified().unwrap(), before);
}

#[tokio::test]
async fn test_download_job_creates_missing_target() {
    let temp = tempfile::tempdir().unwrap();
    let mut lobby = test_lobby(Some(temp.path().join("scratch").as_path()));
    let server = MockHttpServer::start(MockHttpReply::conditional(b"full body", hours_ago(24)));
    let target = temp.path().join("games").join("ba.sdz");

    lobby
        .download("dl", &server.url("/ba.sdz"), &target)
        .unwrap();
    let events = pump_until(&mut lobby, |evs| !evs.is_empty()).await;

    assert!(matches!(
        &events[0],
        Event::JobResult { job_id, kind, outcome: Ok(_) } if job_id == "dl" && kind == "download"
    ));
    assert_eq!(fs::read(&target).unwrap(), b"full body");
}

#[tokio::test]
async fn test_failed_download_keeps_original() {
    let temp = tempfile::tempdir().unwrap();
    let mut lobby = test_lobby(Some(temp.path()));
    let server = MockHttpServer::start(MockHttpReply::Truncated {
        declared: 4096,
        sent: b"half".to_vec(),
    });
    let target = temp.path().join("y.zip");
    fs::write(&target, b"original").unwrap();
    lobby.download("dl", &server.url("/y.zip"), &target).unwrap();
    let events = pump_until(&mut lobby, |evs| !evs.is_empty()).await;

    assert!(matches!(&events[0], Event::JobResult { outcome: Err(_), .. }));
    assert_eq!(fs::read(&target).unwrap(), b"original");
}

#[tokio::test]
async fn test_second_download_with_same_id_is_not_ready() {
    let temp = tempfile::tempdir().unwrap();
    let mut lobby = test_lobby(Some(temp.path()));
    let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

    lobby
        .start_job("dl", "download", move |_| {
            let _ = release_rx.recv();
            Ok("done".to_string())
        })
        .unwrap();
    let err = lobby
        .download("dl", "http://127.0.0.1:9/y.zip", temp.path().join("y.zip"))
        .unwrap_err();
    assert!(matches!(err, weblobby_core::Error::NotReady { .. }));

    release_tx.send(()).unwrap();
    let events = pump_until(&mut lobby, |evs| !evs.is_empty()).await;
    assert_eq!(events.len(), 1);
}
