//! Lobby server session through the public Lobby API

use std::time::Duration;

use weblobby_core::Event;
use weblobby_daemon::test_utils::MockLineServer;

use crate::{pump_for, pump_until, test_lobby};

fn network_lines(events: &[Event]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::NetworkLine { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_split_packet_yields_single_line() {
    let server = MockLineServer::bind().await;
    let mut lobby = test_lobby(None);

    lobby.connect_to("127.0.0.1", server.port());
    let mut peer = server.accept().await;
    peer.write_chunks(&[b"Hel", b"lo\n"], Duration::from_millis(50))
        .await;

    let mut events = pump_until(&mut lobby, |evs| !network_lines(evs).is_empty()).await;
    events.extend(pump_for(&mut lobby, Duration::from_millis(100)).await);

    assert_eq!(events, vec![Event::network_line("Hello")]);
}

#[tokio::test]
async fn test_protocol_conversation() {
    let server = MockLineServer::bind().await;
    let mut lobby = test_lobby(None);

    lobby.connect_to("127.0.0.1", server.port());
    let mut peer = server.accept().await;
    peer.write_chunks(&[b"TASSERVER 0.38 * 8201 0\n"], Duration::ZERO)
        .await;
    pump_until(&mut lobby, |evs| !evs.is_empty()).await;

    lobby.send("LOGIN player c2VjcmV0 0 * weblobby");
    assert_eq!(
        peer.read_line().await.as_deref(),
        Some("LOGIN player c2VjcmV0 0 * weblobby")
    );

    peer.write_chunks(&[b"ACCEPTED player\nMOTD welcome\nLOGININFOEND\n"], Duration::ZERO)
        .await;
    let events = pump_until(&mut lobby, |evs| network_lines(evs).len() >= 3).await;
    assert_eq!(
        network_lines(&events),
        vec!["ACCEPTED player", "MOTD welcome", "LOGININFOEND"]
    );
}

#[tokio::test]
async fn test_disconnect_never_connected_is_silent() {
    let mut lobby = test_lobby(None);

    lobby.disconnect();
    lobby.disconnect();

    assert!(pump_for(&mut lobby, Duration::from_millis(200))
        .await
        .is_empty());
}

#[tokio::test]
async fn test_server_hangup_is_reported_then_reconnect_works() {
    let server = MockLineServer::bind().await;
    let mut lobby = test_lobby(None);

    lobby.connect_to("127.0.0.1", server.port());
    drop(server.accept().await);

    let events = pump_until(&mut lobby, |evs| !evs.is_empty()).await;
    assert!(matches!(&events[0], Event::NetworkError { .. }));

    lobby.connect_to("127.0.0.1", server.port());
    let mut peer = server.accept().await;
    peer.write_chunks(&[b"PONG\n"], Duration::ZERO).await;
    let events = pump_until(&mut lobby, |evs| !evs.is_empty()).await;
    assert_eq!(events, vec![Event::network_line("PONG")]);
}
