// Protocol messages for client-relay communication.
//
// Two enums define the full protocol vocabulary:
// - `ClientMessage`: sent by viewers to the relay.
// - `ServerMessage`: sent by the relay to viewers.
//
// Wire naming follows the original event vocabulary: snake_case event tags
// (`join_session`, `play`, `sync_action`, ...) with camelCase payload
// fields (`sessionId`, `currentTime`, `videoId`). Optional `currentTime`
// fields preserve present-vs-absent on the wire: an absent field means the
// sender could not read its player's position, and the relay falls back to
// its last authoritative value.
//
// `video_change` is asymmetric on purpose: client→server carries the raw
// string (untrusted input, validated by the relay before any mutation or
// broadcast), while server→client carries a validated `VideoId`.

use serde::{Deserialize, Serialize};

use crate::types::SessionId;
use crate::video::VideoId;

/// Messages sent by a viewer to the relay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join (or switch to) a viewing session.
    #[serde(rename_all = "camelCase")]
    JoinSession { session_id: SessionId },
    /// Local viewer pressed play.
    #[serde(rename_all = "camelCase")]
    Play {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        current_time: Option<f64>,
    },
    /// Local viewer pressed pause.
    #[serde(rename_all = "camelCase")]
    Pause {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        current_time: Option<f64>,
    },
    /// Local viewer scrubbed to a new position.
    #[serde(rename_all = "camelCase")]
    Seek { current_time: f64 },
    /// Local viewer loaded a different video. Raw string — the relay
    /// validates it as an 11-character id before acting.
    #[serde(rename_all = "camelCase")]
    VideoChange { video_id: String },
    /// Viewer is leaving gracefully.
    Goodbye,
}

/// Messages sent by the relay to a viewer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full session state, sent once to a newly joined viewer.
    SyncState(SessionSnapshot),
    /// A relayed action from another viewer in the same session.
    SyncAction(SyncAction),
    /// Updated member count for the viewer's session.
    UserCount { count: usize },
}

/// A playback action relayed to the other members of a session. Never
/// delivered to the viewer that originated it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncAction {
    /// Start playback at the relay's authoritative position.
    #[serde(rename_all = "camelCase")]
    Play { current_time: f64 },
    /// Pause playback at the relay's authoritative position.
    #[serde(rename_all = "camelCase")]
    Pause { current_time: f64 },
    /// Jump to a position without changing play state.
    #[serde(rename_all = "camelCase")]
    Seek { current_time: f64 },
    /// Load a different video (starts paused at 0).
    #[serde(rename_all = "camelCase")]
    VideoChange { video_id: VideoId },
}

/// Read-only view of a session, used to catch a new joiner up.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub video_id: Option<VideoId>,
    pub is_playing: bool,
    pub current_time: f64,
    pub user_count: usize,
}
