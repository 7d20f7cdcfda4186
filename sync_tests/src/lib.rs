// Test-only viewer for sync integration tests.
//
// Wraps a real `SyncClient` (from `couchsync_relay::client`), a real
// `SyncGuard` (from `couchsync_relay::sync`) and a scripted `MediaPlayer`
// to provide a synchronous, test-friendly API for exercising the full
// sync pipeline: join → snapshot → action → relay → guard → player.
//
// The only test-specific code here is the scripted player and the
// blocking wrappers around `SyncClient::poll()`. All networking and guard
// logic uses the same code paths as a real viewer.
//
// See also: `tests/full_pipeline.rs` for the scenarios.

use std::thread;
use std::time::{Duration, Instant};

use couchsync_protocol::message::{ServerMessage, SessionSnapshot};
use couchsync_protocol::types::SessionId;
use couchsync_protocol::video::VideoId;
use couchsync_relay::client::SyncClient;
use couchsync_relay::sync::{MediaPlayer, RemoteOutcome, SyncGuard};

/// Default timeout for blocking poll operations.
const POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Sleep duration between poll attempts.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Suppression window used in tests. Short enough that a test can wait it
/// out, long enough that "inside the window" assertions are stable.
pub const TEST_WINDOW: Duration = Duration::from_millis(100);

/// A scripted player widget recording everything done to it.
#[derive(Default)]
pub struct ScriptedPlayer {
    pub ready: bool,
    pub playing: bool,
    pub position: Option<f64>,
    pub seeks: Vec<f64>,
}

impl MediaPlayer for ScriptedPlayer {
    fn is_ready(&self) -> bool {
        self.ready
    }
    fn play(&mut self) {
        self.playing = true;
    }
    fn pause(&mut self) {
        self.playing = false;
    }
    fn seek_to(&mut self, seconds: f64) {
        self.seeks.push(seconds);
        self.position = Some(seconds);
    }
    fn current_time(&self) -> Option<f64> {
        self.position
    }
}

/// A test viewer wrapping a real client, guard, and scripted player.
pub struct TestViewer {
    client: SyncClient,
    pub guard: SyncGuard,
    pub player: ScriptedPlayer,
    /// Last `user_count` heard from the relay.
    pub user_count: usize,
    /// Last `sync_state` snapshot received.
    pub snapshot: Option<SessionSnapshot>,
    /// Video changes the guard deferred to the owning component.
    pub deferred_videos: Vec<VideoId>,
}

impl TestViewer {
    /// Connect to a relay with a ready player at position 0.
    pub fn connect(addr: std::net::SocketAddr) -> Self {
        let client = SyncClient::connect(&addr.to_string()).expect("TestViewer::connect failed");
        Self {
            client,
            guard: SyncGuard::with_window(TEST_WINDOW),
            player: ScriptedPlayer {
                ready: true,
                position: Some(0.0),
                ..ScriptedPlayer::default()
            },
            user_count: 0,
            snapshot: None,
            deferred_videos: Vec::new(),
        }
    }

    /// Join a session and block until the snapshot arrives.
    pub fn join(&mut self, session: &str) -> SessionSnapshot {
        self.snapshot = None;
        self.client
            .join(&SessionId::new(session))
            .expect("join failed");
        self.wait_until(|v| v.snapshot.is_some(), "sync_state snapshot");
        self.snapshot.clone().expect("snapshot present")
    }

    /// Drain the inbox, routing every message where a real viewer would:
    /// snapshots and counts into fields, actions through the guard into
    /// the player. Returns the number of messages processed.
    pub fn pump(&mut self) -> usize {
        let messages = self.client.poll();
        let count = messages.len();
        for msg in messages {
            match msg {
                ServerMessage::SyncState(snap) => {
                    self.user_count = snap.user_count;
                    self.snapshot = Some(snap);
                }
                ServerMessage::UserCount { count } => {
                    self.user_count = count;
                }
                ServerMessage::SyncAction(action) => {
                    if let RemoteOutcome::VideoChange(id) =
                        self.guard.apply_remote(&action, &mut self.player)
                    {
                        self.deferred_videos.push(id);
                    }
                }
            }
        }
        count
    }

    /// Pump until `cond` holds or the timeout expires.
    pub fn wait_until(&mut self, cond: impl Fn(&Self) -> bool, what: &str) {
        let start = Instant::now();
        loop {
            self.pump();
            if cond(self) {
                return;
            }
            assert!(
                start.elapsed() < POLL_TIMEOUT,
                "timed out waiting for {what}"
            );
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Let the suppression window lapse (plus the relay a beat to settle).
    pub fn wait_out_window(&mut self) {
        thread::sleep(TEST_WINDOW + Duration::from_millis(20));
        self.pump();
    }

    /// Emit a local play through the guard. Returns false if the guard
    /// swallowed it as an echo.
    pub fn emit_play(&mut self) -> bool {
        match self.guard.emit_play(&self.player) {
            Some(msg) => {
                self.player.play(); // local optimistic apply
                self.client.send(&msg).expect("send play failed");
                true
            }
            None => false,
        }
    }

    /// Emit a local pause through the guard.
    pub fn emit_pause(&mut self) -> bool {
        match self.guard.emit_pause(&self.player) {
            Some(msg) => {
                self.player.pause();
                self.client.send(&msg).expect("send pause failed");
                true
            }
            None => false,
        }
    }

    /// Emit a relative local seek through the guard.
    pub fn emit_seek(&mut self, delta: f64) -> bool {
        match self.guard.emit_seek(&mut self.player, delta) {
            Some(msg) => {
                self.client.send(&msg).expect("send seek failed");
                true
            }
            None => false,
        }
    }

    /// Send a video change from a pasted URL or bare id. The owning
    /// component does this directly — video changes don't go through the
    /// guard on the way out.
    pub fn send_video_url(&mut self, url: &str) {
        let id = VideoId::extract(url).expect("test URL must contain a valid id");
        self.client
            .send_video_change(&id)
            .expect("send video_change failed");
    }

    /// Send a raw (possibly invalid) video id, bypassing extraction.
    pub fn send_raw_video_id(&mut self, raw: &str) {
        self.client
            .send(&couchsync_protocol::message::ClientMessage::VideoChange {
                video_id: raw.into(),
            })
            .expect("send raw video_change failed");
    }

    /// Send a raw seek, bypassing the guard (for invalid-input tests).
    pub fn send_raw_seek(&mut self, current_time: f64) {
        self.client
            .send(&couchsync_protocol::message::ClientMessage::Seek { current_time })
            .expect("send raw seek failed");
    }

    /// Say goodbye and drop the connection.
    pub fn disconnect(&mut self) {
        self.client.disconnect();
    }
}
