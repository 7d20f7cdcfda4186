// couchsync_protocol — wire protocol for watch-together session sync.
//
// This crate defines the message types, framing, and validation used by the
// relay server (`couchsync_relay`) and viewer clients to communicate over
// TCP. It is shared between both sides and has no dependency on the relay
// or any player widget.
//
// Module overview:
// - `types.rs`:    `SessionId` — the key of a shared viewing session.
// - `video.rs`:    `VideoId` — validated 11-character external video id,
//                  plus extraction from the URL shapes users paste.
// - `message.rs`:  Client-to-relay and relay-to-client message enums, plus
//                  `SyncAction` and the `SessionSnapshot` sent to joiners.
// - `framing.rs`:  Length-delimited framing over any `Read`/`Write` stream:
//                  4-byte big-endian length prefix, then JSON payload.
//
// Design decisions:
// - **JSON serialization.** Keeps the wire human-readable and matches the
//   original event vocabulary (snake_case events, camelCase fields).
// - **Validation at the type level.** `VideoId` deserializes through
//   `TryFrom<String>`, so relay→client traffic can only carry valid ids.
//   The untrusted client→relay direction carries a raw string the relay
//   validates explicitly.
// - **No async runtime.** Uses `std::io::Read`/`Write` for framing,
//   compatible with blocking TCP streams and buffered wrappers.

pub mod framing;
pub mod message;
pub mod types;
pub mod video;

pub use framing::{MAX_MESSAGE_SIZE, read_message, write_message};
pub use message::{ClientMessage, ServerMessage, SessionSnapshot, SyncAction};
pub use types::SessionId;
pub use video::VideoId;

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    fn to_value<T: serde::Serialize>(msg: &T) -> Value {
        serde_json::to_value(msg).unwrap()
    }

    #[test]
    fn join_session_wire_shape() {
        let msg = ClientMessage::JoinSession {
            session_id: SessionId::default(),
        };
        assert_eq!(to_value(&msg), json!({"join_session": {"sessionId": "room1"}}));
    }

    #[test]
    fn play_omits_absent_time() {
        let msg = ClientMessage::Play { current_time: None };
        assert_eq!(to_value(&msg), json!({"play": {}}));

        let parsed: ClientMessage = serde_json::from_value(json!({"play": {}})).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn play_carries_present_time() {
        let msg = ClientMessage::Play {
            current_time: Some(42.5),
        };
        assert_eq!(to_value(&msg), json!({"play": {"currentTime": 42.5}}));
    }

    #[test]
    fn sync_action_is_tagged_on_type() {
        let msg = ServerMessage::SyncAction(SyncAction::Seek { current_time: 10.0 });
        assert_eq!(
            to_value(&msg),
            json!({"sync_action": {"type": "seek", "currentTime": 10.0}})
        );
    }

    #[test]
    fn video_change_action_wire_shape() {
        let msg = ServerMessage::SyncAction(SyncAction::VideoChange {
            video_id: VideoId::parse("dQw4w9WgXcQ").unwrap(),
        });
        assert_eq!(
            to_value(&msg),
            json!({"sync_action": {"type": "video_change", "videoId": "dQw4w9WgXcQ"}})
        );
    }

    #[test]
    fn sync_state_wire_shape() {
        let msg = ServerMessage::SyncState(SessionSnapshot {
            video_id: None,
            is_playing: false,
            current_time: 0.0,
            user_count: 1,
        });
        assert_eq!(
            to_value(&msg),
            json!({"sync_state": {
                "videoId": null,
                "isPlaying": false,
                "currentTime": 0.0,
                "userCount": 1
            }})
        );
    }

    #[test]
    fn sync_action_with_bad_video_id_fails_to_parse() {
        let wire = json!({"sync_action": {"type": "video_change", "videoId": "nope"}});
        assert!(serde_json::from_value::<ServerMessage>(wire).is_err());
    }

    #[test]
    fn roundtrip_through_framing() {
        let msg = ClientMessage::Seek { current_time: 12.25 };
        let jsonb = serde_json::to_vec(&msg).unwrap();
        let mut wire = Vec::new();
        write_message(&mut wire, &jsonb).unwrap();

        let mut cursor = std::io::Cursor::new(&wire);
        let recovered_json = read_message(&mut cursor).unwrap();
        let recovered: ClientMessage = serde_json::from_slice(&recovered_json).unwrap();
        assert_eq!(recovered, msg);
    }
}
