// Session state for the sync relay.
//
// `Session` is the authoritative playback state of one shared viewing
// session: which video is loaded, whether it is playing, the last known
// position, and the set of joined members. It is pure data + mutators —
// no I/O. The server (`server.rs`) owns the write halves of the client
// connections and does all broadcasting; keeping the store free of streams
// means every state transition can be tested in isolation.
//
// `SessionRegistry` is the explicit owner of all sessions, keyed by
// `SessionId`, with a member→session index so that a disconnect is scoped
// to the session the member actually joined. It is constructed by the
// server's event loop and passed to the handlers — there is no global
// accessor. All mutation happens from the server's single-threaded main
// loop, so no internal locking is needed.
//
// Lifetime policy: a session is created lazily on the first join and never
// evicted. An empty session keeps its video and position, so viewers
// returning to a room resume where it left off. Acceptable for a
// single-process deployment; an eviction pass would be needed before
// letting arbitrary keys in.

use std::collections::{BTreeMap, BTreeSet};

use couchsync_protocol::message::SessionSnapshot;
use couchsync_protocol::types::SessionId;
use couchsync_protocol::video::VideoId;

/// Relay-assigned connection id. Never serialized — wire messages identify
/// sessions, not members.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberId(pub u64);

/// Authoritative playback state of one viewing session.
#[derive(Debug, Default)]
pub struct Session {
    video_id: Option<VideoId>,
    is_playing: bool,
    current_time: f64,
    members: BTreeSet<MemberId>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member. Idempotent — re-joining does not double count.
    /// Returns the new member count.
    pub fn join(&mut self, member: MemberId) -> usize {
        self.members.insert(member);
        self.members.len()
    }

    /// Remove a member. Safe to call for a member that never joined.
    /// Returns the new member count.
    pub fn leave(&mut self, member: MemberId) -> usize {
        self.members.remove(&member);
        self.members.len()
    }

    /// Replace the current video. A new video starts paused from the
    /// beginning — position and play state of the previous video are
    /// meaningless for it, so both are reset here, not by the caller.
    pub fn set_video(&mut self, video_id: VideoId) {
        self.video_id = Some(video_id);
        self.is_playing = false;
        self.current_time = 0.0;
    }

    /// Update play state, and position if one was reported. Does not touch
    /// the video identity.
    pub fn set_playing(&mut self, is_playing: bool, current_time: Option<f64>) {
        self.is_playing = is_playing;
        if let Some(t) = current_time {
            self.current_time = t;
        }
    }

    /// Update the playback position only.
    pub fn set_current_time(&mut self, current_time: f64) {
        self.current_time = current_time;
    }

    pub fn video_id(&self) -> Option<&VideoId> {
        self.video_id.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn members(&self) -> impl Iterator<Item = MemberId> + '_ {
        self.members.iter().copied()
    }

    /// Read-only view used to catch a new joiner up.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            video_id: self.video_id.clone(),
            is_playing: self.is_playing,
            current_time: self.current_time,
            user_count: self.members.len(),
        }
    }
}

/// Result of `SessionRegistry::join`.
pub struct JoinOutcome {
    /// Post-join snapshot of the joined session.
    pub snapshot: SessionSnapshot,
    /// Session the member was moved out of, with its new count, if the
    /// member had been joined elsewhere.
    pub vacated: Option<(SessionId, usize)>,
}

/// All sessions of one relay process, keyed by session id, plus the
/// member→session index that scopes disconnects.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: BTreeMap<SessionId, Session>,
    by_member: BTreeMap<MemberId, SessionId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join a member to a session, creating the session on first use. A
    /// member joined elsewhere is moved: removed from its old session
    /// (reported in `vacated` so the server can broadcast that session's
    /// updated count) and added to the new one.
    pub fn join(&mut self, session_id: SessionId, member: MemberId) -> JoinOutcome {
        let vacated = match self.by_member.get(&member) {
            Some(current) if *current != session_id => self.leave(member),
            _ => None,
        };

        let session = self.sessions.entry(session_id.clone()).or_default();
        session.join(member);
        self.by_member.insert(member, session_id);

        JoinOutcome {
            snapshot: session.snapshot(),
            vacated,
        }
    }

    /// Remove a member from whichever session it joined. Returns that
    /// session's id and new count, or `None` if the member never joined.
    /// The session entry itself is kept (see lifetime policy above).
    pub fn leave(&mut self, member: MemberId) -> Option<(SessionId, usize)> {
        let session_id = self.by_member.remove(&member)?;
        let count = self
            .sessions
            .get_mut(&session_id)
            .map(|s| s.leave(member))
            .unwrap_or(0);
        Some((session_id, count))
    }

    /// The session a member has joined, if any.
    pub fn session_of(&self, member: MemberId) -> Option<&SessionId> {
        self.by_member.get(&member)
    }

    pub fn get(&self, session_id: &SessionId) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    pub fn get_mut(&mut self, session_id: &SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(session_id)
    }

    pub fn snapshot(&self, session_id: &SessionId) -> Option<SessionSnapshot> {
        self.sessions.get(session_id).map(Session::snapshot)
    }

    /// Members of a session, collected so the caller can send while
    /// holding `&mut self` elsewhere.
    pub fn members_of(&self, session_id: &SessionId) -> Vec<MemberId> {
        self.sessions
            .get(session_id)
            .map(|s| s.members().collect())
            .unwrap_or_default()
    }
}
