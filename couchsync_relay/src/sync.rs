// Client-side sync guard: applies remote actions to the local player
// without re-emitting them.
//
// The player widget's play/pause callbacks fire asynchronously, and a
// remotely-triggered seek or play can look exactly like a local user
// action a moment later. Without a guard, two synchronized viewers would
// ping-pong the same action forever. The guard is a time-boxed suppression
// window: applying a remote action arms it, and while it is armed both
// directions are gated — further remote actions are dropped and local
// emissions are swallowed as presumed echoes.
//
// The window is a deadline `Instant` checked lazily rather than a flag
// cleared by a timer thread; this fits the poll-based single-threaded
// client and means a stale window after a player swap simply expires with
// no one to cancel. The fixed delay is a heuristic, not an
// acknowledgement: it can swallow a genuine user action inside the window
// and can be too short on a slow network. See DESIGN.md before "fixing"
// this.
//
// The player itself is behind the `MediaPlayer` trait — the widget is an
// external capability, and its failures never propagate: a widget that is
// not ready drops the action, a failed position read emits with the time
// field absent.

use std::time::{Duration, Instant};

use couchsync_protocol::message::{ClientMessage, SyncAction};
use couchsync_protocol::video::VideoId;

/// How long local events are treated as echoes after applying a remote
/// action. Long enough for the widget's async callbacks to settle.
pub const SUPPRESS_WINDOW: Duration = Duration::from_millis(500);

/// The local player widget boundary. Implementations must not panic;
/// a dead or detached widget reports `is_ready() == false` and a failed
/// position read returns `None`.
pub trait MediaPlayer {
    /// Whether the widget is attached and initialized.
    fn is_ready(&self) -> bool;
    fn play(&mut self);
    fn pause(&mut self);
    fn seek_to(&mut self, seconds: f64);
    /// Current playback position in seconds, or `None` if the read failed.
    fn current_time(&self) -> Option<f64>;
}

/// What `SyncGuard::apply_remote` did with a remote action.
#[derive(Clone, Debug, PartialEq)]
pub enum RemoteOutcome {
    /// The action was applied to the local player.
    Applied,
    /// A video change — loading the new video belongs to the component
    /// that owns the player widget, not the guard.
    VideoChange(VideoId),
    /// Suppressed or the player was not ready; nothing happened.
    Dropped,
}

/// Re-entrancy guard between the relay and the local player.
pub struct SyncGuard {
    suppressed_until: Option<Instant>,
    window: Duration,
}

impl SyncGuard {
    pub fn new() -> Self {
        Self::with_window(SUPPRESS_WINDOW)
    }

    /// Construct with a custom suppression window (tests use short ones).
    pub fn with_window(window: Duration) -> Self {
        Self {
            suppressed_until: None,
            window,
        }
    }

    /// Whether the suppression window is currently armed.
    pub fn is_suppressed(&self) -> bool {
        self.suppressed_until
            .is_some_and(|deadline| Instant::now() < deadline)
    }

    /// Apply a remote action to the local player. Dropped if the window is
    /// already armed or the player is not ready. Otherwise the window is
    /// armed first — whatever the player then does, the next half-second
    /// of local events is treated as fallout of this application.
    pub fn apply_remote<P: MediaPlayer>(
        &mut self,
        action: &SyncAction,
        player: &mut P,
    ) -> RemoteOutcome {
        if self.is_suppressed() || !player.is_ready() {
            return RemoteOutcome::Dropped;
        }
        self.suppressed_until = Some(Instant::now() + self.window);

        match action {
            SyncAction::Play { current_time } => {
                player.seek_to(*current_time);
                player.play();
                RemoteOutcome::Applied
            }
            SyncAction::Pause { current_time } => {
                player.seek_to(*current_time);
                player.pause();
                RemoteOutcome::Applied
            }
            SyncAction::Seek { current_time } => {
                player.seek_to(*current_time);
                RemoteOutcome::Applied
            }
            SyncAction::VideoChange { video_id } => RemoteOutcome::VideoChange(video_id.clone()),
        }
    }

    /// Build a `play` message from the local player state, or `None` when
    /// the event is a presumed echo (window armed) or the player is not
    /// ready. A failed position read still emits — the relay falls back to
    /// its last authoritative time.
    pub fn emit_play<P: MediaPlayer>(&self, player: &P) -> Option<ClientMessage> {
        if self.is_suppressed() || !player.is_ready() {
            return None;
        }
        Some(ClientMessage::Play {
            current_time: player.current_time(),
        })
    }

    /// Symmetric to `emit_play`.
    pub fn emit_pause<P: MediaPlayer>(&self, player: &P) -> Option<ClientMessage> {
        if self.is_suppressed() || !player.is_ready() {
            return None;
        }
        Some(ClientMessage::Pause {
            current_time: player.current_time(),
        })
    }

    /// Relative scrub: compute the target from the current position,
    /// clamped at zero, seek the local player there and build the `seek`
    /// message. `None` when suppressed, the player is not ready, or the
    /// position cannot be read (no base to scrub from).
    pub fn emit_seek<P: MediaPlayer>(&self, player: &mut P, delta: f64) -> Option<ClientMessage> {
        if self.is_suppressed() || !player.is_ready() {
            return None;
        }
        let current = player.current_time()?;
        let target = (current + delta).max(0.0);
        player.seek_to(target);
        Some(ClientMessage::Seek {
            current_time: target,
        })
    }
}

impl Default for SyncGuard {
    fn default() -> Self {
        Self::new()
    }
}
