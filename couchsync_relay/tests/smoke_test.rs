// Integration smoke test for the sync relay.
//
// Starts a relay on localhost, connects mock TCP viewers, and exercises
// the full protocol lifecycle: join with snapshot catch-up, play/pause/
// seek/video-change broadcasts with sender exclusion, silent drops of
// invalid payloads, and graceful disconnect.
//
// Each viewer is a plain TCP socket using the protocol crate's framing and
// message types — no client or guard code involved. This tests the relay
// end-to-end without any player dependency.

use std::io::{BufReader, BufWriter};
use std::net::TcpStream;
use std::time::Duration;

use couchsync_protocol::framing::{read_message, write_message};
use couchsync_protocol::message::{ClientMessage, ServerMessage, SyncAction};
use couchsync_protocol::types::SessionId;
use couchsync_relay::server::{RelayConfig, start_relay};

/// Helper: send a ClientMessage over a framed TCP stream.
fn send(writer: &mut BufWriter<TcpStream>, msg: &ClientMessage) {
    let json = serde_json::to_vec(msg).unwrap();
    write_message(writer, &json).unwrap();
}

/// Helper: receive a ServerMessage from a framed TCP stream.
fn recv(reader: &mut BufReader<TcpStream>) -> ServerMessage {
    let bytes = read_message(reader).unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Connect to the relay and join the given session. Returns the
/// reader/writer pair and the snapshot received.
fn connect_and_join(
    addr: std::net::SocketAddr,
    session: &str,
) -> (
    BufReader<TcpStream>,
    BufWriter<TcpStream>,
    couchsync_protocol::message::SessionSnapshot,
) {
    let stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let reader_stream = stream.try_clone().unwrap();
    let mut writer = BufWriter::new(stream);
    let mut reader = BufReader::new(reader_stream);

    send(
        &mut writer,
        &ClientMessage::JoinSession {
            session_id: SessionId::new(session),
        },
    );

    let snapshot = match recv(&mut reader) {
        ServerMessage::SyncState(snap) => snap,
        other => panic!("expected SyncState, got {other:?}"),
    };
    // Followed by the session-wide count update, which includes us.
    match recv(&mut reader) {
        ServerMessage::UserCount { count } => assert_eq!(count, snapshot.user_count),
        other => panic!("expected UserCount, got {other:?}"),
    }

    (reader, writer, snapshot)
}

/// Drain all currently buffered messages using a short read timeout.
fn drain_messages(reader: &mut BufReader<TcpStream>) -> Vec<ServerMessage> {
    let mut messages = Vec::new();
    if let Ok(stream) = reader.get_ref().try_clone() {
        stream
            .set_read_timeout(Some(Duration::from_millis(50)))
            .ok();
    }
    for _ in 0..50 {
        match read_message(reader) {
            Ok(bytes) => match serde_json::from_slice::<ServerMessage>(&bytes) {
                Ok(msg) => messages.push(msg),
                Err(_) => break,
            },
            Err(_) => break,
        }
    }
    // Restore longer timeout for subsequent blocking reads.
    if let Ok(stream) = reader.get_ref().try_clone() {
        stream.set_read_timeout(Some(Duration::from_secs(5))).ok();
    }
    messages
}

#[test]
fn full_session_lifecycle() {
    // 1. Start a relay on a random port.
    let (handle, addr) = start_relay(RelayConfig { port: 0 }).unwrap();

    // Give the listener thread a moment to start.
    std::thread::sleep(Duration::from_millis(50));

    // 2. First viewer joins an empty session: null video, paused at 0,
    //    alone.
    let (mut reader_a, mut writer_a, snap_a) = connect_and_join(addr, "room1");
    assert_eq!(snap_a.video_id, None);
    assert!(!snap_a.is_playing);
    assert_eq!(snap_a.current_time, 0.0);
    assert_eq!(snap_a.user_count, 1);

    // 3. Second viewer joins: same snapshot shape with two members, and
    //    the first viewer hears the count change.
    let (mut reader_b, mut writer_b, snap_b) = connect_and_join(addr, "room1");
    assert_eq!(snap_b.user_count, 2);
    match recv(&mut reader_a) {
        ServerMessage::UserCount { count } => assert_eq!(count, 2),
        other => panic!("expected UserCount, got {other:?}"),
    }

    // 4. A loads a video — B receives the action, A does not get an echo.
    send(
        &mut writer_a,
        &ClientMessage::VideoChange {
            video_id: "dQw4w9WgXcQ".into(),
        },
    );
    match recv(&mut reader_b) {
        ServerMessage::SyncAction(SyncAction::VideoChange { video_id }) => {
            assert_eq!(video_id.as_str(), "dQw4w9WgXcQ");
        }
        other => panic!("expected VideoChange, got {other:?}"),
    }

    // 5. A plays at 42.5 — B hears it with the authoritative time.
    send(
        &mut writer_a,
        &ClientMessage::Play {
            current_time: Some(42.5),
        },
    );
    match recv(&mut reader_b) {
        ServerMessage::SyncAction(SyncAction::Play { current_time }) => {
            assert_eq!(current_time, 42.5);
        }
        other => panic!("expected Play, got {other:?}"),
    }

    // 6. B seeks to 10 — A hears it; play state is untouched, which a
    //    late joiner's snapshot will prove.
    send(&mut writer_b, &ClientMessage::Seek { current_time: 10.0 });
    match recv(&mut reader_a) {
        ServerMessage::SyncAction(SyncAction::Seek { current_time }) => {
            assert_eq!(current_time, 10.0);
        }
        other => panic!("expected Seek, got {other:?}"),
    }

    // 7. An invalid seek is dropped without a trace.
    send(&mut writer_b, &ClientMessage::Seek { current_time: -5.0 });

    // 8. A late joiner catches up on everything at once.
    let (_reader_c, _writer_c, snap_c) = connect_and_join(addr, "room1");
    assert_eq!(snap_c.video_id.unwrap().as_str(), "dQw4w9WgXcQ");
    assert!(snap_c.is_playing);
    assert_eq!(snap_c.current_time, 10.0);
    assert_eq!(snap_c.user_count, 3);

    // Both existing viewers hear the third member arrive (and nothing
    // else queued in between — the invalid seek left no trace).
    let messages_a = drain_messages(&mut reader_a);
    assert!(
        matches!(messages_a.as_slice(), [ServerMessage::UserCount { count: 3 }]),
        "expected only UserCount(3) for A, got: {messages_a:?}"
    );
    let messages_b = drain_messages(&mut reader_b);
    assert!(
        matches!(messages_b.as_slice(), [ServerMessage::UserCount { count: 3 }]),
        "expected only UserCount(3) for B, got: {messages_b:?}"
    );

    // 9. A says goodbye — the others hear the count drop.
    send(&mut writer_a, &ClientMessage::Goodbye);
    std::thread::sleep(Duration::from_millis(150));
    let messages_b = drain_messages(&mut reader_b);
    assert!(
        messages_b
            .iter()
            .any(|m| matches!(m, ServerMessage::UserCount { count: 2 })),
        "expected UserCount(2) after goodbye, got: {messages_b:?}"
    );

    // 10. Graceful shutdown.
    drop(writer_b);
    drop(reader_b);
    handle.stop();
}

#[test]
fn sessions_are_isolated() {
    let (handle, addr) = start_relay(RelayConfig { port: 0 }).unwrap();
    std::thread::sleep(Duration::from_millis(50));

    let (reader_a, mut writer_a, _) = connect_and_join(addr, "room1");
    let (mut reader_b, _writer_b, snap_b) = connect_and_join(addr, "room2");

    // Each room counts only its own members.
    assert_eq!(snap_b.user_count, 1);

    // Actions in room1 never reach room2.
    send(
        &mut writer_a,
        &ClientMessage::Play {
            current_time: Some(5.0),
        },
    );
    std::thread::sleep(Duration::from_millis(150));
    let messages_b = drain_messages(&mut reader_b);
    assert!(
        messages_b.is_empty(),
        "room2 viewer should hear nothing, got: {messages_b:?}"
    );

    // A dropped connection in room1 is invisible to room2.
    drop(writer_a);
    drop(reader_a);
    std::thread::sleep(Duration::from_millis(150));
    let messages_b = drain_messages(&mut reader_b);
    assert!(
        messages_b.is_empty(),
        "room2 viewer should not hear room1 disconnects, got: {messages_b:?}"
    );

    handle.stop();
}

#[test]
fn unparseable_frames_do_not_kill_the_connection() {
    let (handle, addr) = start_relay(RelayConfig { port: 0 }).unwrap();
    std::thread::sleep(Duration::from_millis(50));

    let (mut reader_a, mut writer_a, _) = connect_and_join(addr, "room1");

    // Not a ClientMessage at all.
    write_message(writer_a.get_mut(), br#"{"what":"ever"}"#).unwrap();

    // The connection survives: a join still round-trips.
    send(
        &mut writer_a,
        &ClientMessage::JoinSession {
            session_id: SessionId::new("room1"),
        },
    );
    match recv(&mut reader_a) {
        ServerMessage::SyncState(snap) => assert_eq!(snap.user_count, 1),
        other => panic!("expected SyncState, got {other:?}"),
    }

    handle.stop();
}
