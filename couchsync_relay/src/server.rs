// TCP server and main event loop for the sync relay.
//
// Architecture: thread-per-reader with a central `mpsc` channel.
//
// - **Listener thread** (`TcpListener::accept()` loop): accepts new TCP
//   connections and sends `InternalEvent::Connected` to the main thread.
// - **Reader threads** (one per viewer): call `framing::read_message()` in
//   a loop, deserialize `ClientMessage`, and send
//   `InternalEvent::MessageFrom` to the main thread. On error/EOF, send
//   `InternalEvent::Disconnected`.
// - **Main thread**: owns the `Relay` (session registry + peer writers),
//   receives events from the channel, and dispatches them. Each event is
//   handled to completion before the next is dequeued, so all registry
//   mutation is serialized without locks.
//
// The main thread is the only writer to client TCP streams. Reader threads
// only read. Write errors on a single peer are swallowed — the reader
// thread for that peer will detect the broken pipe and send a
// `Disconnected` event.
//
// Validation happens here, before any mutation: an event with a negative
// or non-finite time, a video id that is not an 11-character token, or a
// sender that never joined a session is dropped silently (debug-logged,
// no state change, no broadcast, no reply). Transport failures are the
// only thing that tears a connection down.
//
// Shutdown: the main thread checks a `keep_running` flag (set to false by
// `RelayHandle::stop`) and breaks out of the event loop.

use std::collections::BTreeMap;
use std::io::{self, BufReader, BufWriter};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use couchsync_protocol::framing::{read_message, write_message};
use couchsync_protocol::message::{ClientMessage, ServerMessage, SyncAction};
use couchsync_protocol::types::SessionId;
use couchsync_protocol::video::VideoId;

use crate::session::{MemberId, SessionRegistry};

/// Events sent from listener/reader threads to the main thread.
enum InternalEvent {
    Connected {
        stream: TcpStream,
    },
    MessageFrom {
        member_id: MemberId,
        message: ClientMessage,
    },
    Disconnected {
        member_id: MemberId,
    },
}

/// Handle returned by `start_relay` to control the running server.
pub struct RelayHandle {
    keep_running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl RelayHandle {
    /// Signal the relay to stop and wait for it to shut down.
    pub fn stop(self) {
        self.keep_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread {
            let _ = handle.join();
        }
    }
}

/// Configuration for starting a relay server.
pub struct RelayConfig {
    pub port: u16,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self { port: 8000 }
    }
}

/// How often the main loop wakes up to re-check the shutdown flag when no
/// events are arriving.
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Start the relay server on a background thread. Returns a handle for
/// stopping it and the actual bound address (useful when port 0 is used
/// to let the OS pick a free port).
pub fn start_relay(config: RelayConfig) -> io::Result<(RelayHandle, std::net::SocketAddr)> {
    let listener = TcpListener::bind(format!("127.0.0.1:{}", config.port))?;
    let addr = listener.local_addr()?;
    let keep_running = Arc::new(AtomicBool::new(true));
    let keep_running_clone = keep_running.clone();

    info!("relay listening on {addr}");

    let thread = thread::spawn(move || {
        run_relay(listener, keep_running_clone);
    });

    Ok((
        RelayHandle {
            keep_running,
            thread: Some(thread),
        },
        addr,
    ))
}

/// Main relay loop. Runs until `keep_running` is set to false.
fn run_relay(listener: TcpListener, keep_running: Arc<AtomicBool>) {
    let mut relay = Relay::new();

    let (tx, rx): (Sender<InternalEvent>, Receiver<InternalEvent>) = mpsc::channel();

    // Non-blocking so the accept thread can check keep_running periodically.
    listener.set_nonblocking(true).ok();

    // Listener thread: accepts new connections.
    let keep_running_listener = keep_running.clone();
    let tx_listener = tx.clone();
    thread::spawn(move || {
        while keep_running_listener.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, _addr)) => {
                    stream.set_nonblocking(false).ok();
                    let _ = tx_listener.send(InternalEvent::Connected { stream });
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(50));
                }
                Err(e) => {
                    warn!("accept failed: {e}");
                    break;
                }
            }
        }
    });

    // Main event loop.
    while keep_running.load(Ordering::SeqCst) {
        match rx.recv_timeout(IDLE_POLL) {
            Ok(event) => {
                handle_event(&mut relay, event, &tx, &keep_running);
                // Drain any additional events that arrived during handling.
                while let Ok(event) = rx.try_recv() {
                    handle_event(&mut relay, event, &tx, &keep_running);
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                // Nothing queued — loop around and re-check the flag.
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// Dispatch a single event to the relay.
fn handle_event(
    relay: &mut Relay,
    event: InternalEvent,
    tx: &Sender<InternalEvent>,
    keep_running: &Arc<AtomicBool>,
) {
    match event {
        InternalEvent::Connected { stream } => {
            let read_stream = match stream.try_clone() {
                Ok(s) => s,
                Err(e) => {
                    warn!("failed to clone stream for reader: {e}");
                    return;
                }
            };
            let member_id = relay.register(stream);
            info!("viewer {member_id:?} connected");

            let tx_reader = tx.clone();
            let keep_running_reader = keep_running.clone();
            thread::spawn(move || {
                reader_loop(BufReader::new(read_stream), member_id, tx_reader, keep_running_reader);
            });
        }
        InternalEvent::MessageFrom { member_id, message } => {
            relay.handle_message(member_id, message);
        }
        InternalEvent::Disconnected { member_id } => {
            relay.handle_disconnect(member_id);
        }
    }
}

/// Reader loop for a single viewer. Runs in its own thread.
///
/// A frame that does not parse as a `ClientMessage` is dropped and the
/// connection kept (fail open, fail quiet); only a transport error or EOF
/// ends the loop with a `Disconnected` event.
fn reader_loop(
    mut reader: BufReader<TcpStream>,
    member_id: MemberId,
    tx: Sender<InternalEvent>,
    keep_running: Arc<AtomicBool>,
) {
    while keep_running.load(Ordering::SeqCst) {
        match read_message(&mut reader) {
            Ok(bytes) => match serde_json::from_slice::<ClientMessage>(&bytes) {
                Ok(ClientMessage::Goodbye) => {
                    let _ = tx.send(InternalEvent::Disconnected { member_id });
                    break;
                }
                Ok(message) => {
                    let _ = tx.send(InternalEvent::MessageFrom { member_id, message });
                }
                Err(e) => {
                    debug!("dropping unparseable message from {member_id:?}: {e}");
                }
            },
            Err(_) => {
                // Read error or EOF.
                let _ = tx.send(InternalEvent::Disconnected { member_id });
                break;
            }
        }
    }
}

/// A connected viewer's write half.
struct Peer {
    writer: BufWriter<TcpStream>,
}

/// The relay protocol handler: the session registry plus the write halves
/// of all connected viewers. Driven entirely by the single-threaded main
/// loop; per-event methods validate, mutate the registry, then broadcast.
struct Relay {
    registry: SessionRegistry,
    peers: BTreeMap<MemberId, Peer>,
    next_member_id: u64,
}

impl Relay {
    fn new() -> Self {
        Self {
            registry: SessionRegistry::new(),
            peers: BTreeMap::new(),
            next_member_id: 0,
        }
    }

    /// Register a new connection's write half. Returns the id the caller
    /// should tag the connection's reader thread with.
    fn register(&mut self, stream: TcpStream) -> MemberId {
        let member_id = MemberId(self.next_member_id);
        self.next_member_id += 1;
        self.peers.insert(
            member_id,
            Peer {
                writer: BufWriter::new(stream),
            },
        );
        member_id
    }

    fn handle_message(&mut self, member_id: MemberId, message: ClientMessage) {
        match message {
            ClientMessage::JoinSession { session_id } => {
                self.handle_join(member_id, session_id);
            }
            ClientMessage::Play { current_time } => {
                self.handle_play_pause(member_id, true, current_time);
            }
            ClientMessage::Pause { current_time } => {
                self.handle_play_pause(member_id, false, current_time);
            }
            ClientMessage::Seek { current_time } => {
                self.handle_seek(member_id, current_time);
            }
            ClientMessage::VideoChange { video_id } => {
                self.handle_video_change(member_id, &video_id);
            }
            ClientMessage::Goodbye => {
                // Handled in the reader loop, which follows up with a
                // Disconnected event.
            }
        }
    }

    /// Join: add the member, catch it up with a snapshot (joiner only),
    /// then tell every member of the session — joiner included — the new
    /// count. If the member moved out of another session, that session
    /// gets its own scoped count update.
    fn handle_join(&mut self, member_id: MemberId, session_id: SessionId) {
        let outcome = self.registry.join(session_id.clone(), member_id);
        info!(
            "viewer {member_id:?} joined session {session_id} ({} watching)",
            outcome.snapshot.user_count
        );

        if let Some((vacated_id, count)) = outcome.vacated {
            self.broadcast_to_session(&vacated_id, &ServerMessage::UserCount { count });
        }

        let count = outcome.snapshot.user_count;
        self.send_to(member_id, &ServerMessage::SyncState(outcome.snapshot));
        self.broadcast_to_session(&session_id, &ServerMessage::UserCount { count });
    }

    /// Play and pause share a shape: optional reported time, play-state
    /// flip, broadcast of the authoritative position to everyone else.
    fn handle_play_pause(&mut self, member_id: MemberId, playing: bool, time: Option<f64>) {
        if let Some(t) = time
            && !valid_time(t)
        {
            debug!("dropping play/pause from {member_id:?}: bad time {t}");
            return;
        }
        let Some(session_id) = self.registry.session_of(member_id).cloned() else {
            debug!("dropping play/pause from {member_id:?}: not in a session");
            return;
        };
        let Some(session) = self.registry.get_mut(&session_id) else {
            return;
        };
        session.set_playing(playing, time);
        let authoritative = session.current_time();

        let action = if playing {
            SyncAction::Play {
                current_time: authoritative,
            }
        } else {
            SyncAction::Pause {
                current_time: authoritative,
            }
        };
        self.broadcast_to_others(&session_id, member_id, &ServerMessage::SyncAction(action));
    }

    fn handle_seek(&mut self, member_id: MemberId, time: f64) {
        if !valid_time(time) {
            debug!("dropping seek from {member_id:?}: bad time {time}");
            return;
        }
        let Some(session_id) = self.registry.session_of(member_id).cloned() else {
            debug!("dropping seek from {member_id:?}: not in a session");
            return;
        };
        let Some(session) = self.registry.get_mut(&session_id) else {
            return;
        };
        session.set_current_time(time);

        let action = SyncAction::Seek { current_time: time };
        self.broadcast_to_others(&session_id, member_id, &ServerMessage::SyncAction(action));
    }

    fn handle_video_change(&mut self, member_id: MemberId, raw_id: &str) {
        let Some(video_id) = VideoId::parse(raw_id) else {
            debug!("dropping video_change from {member_id:?}: bad id {raw_id:?}");
            return;
        };
        let Some(session_id) = self.registry.session_of(member_id).cloned() else {
            debug!("dropping video_change from {member_id:?}: not in a session");
            return;
        };
        let Some(session) = self.registry.get_mut(&session_id) else {
            return;
        };
        session.set_video(video_id.clone());
        info!("session {session_id} now watching {video_id}");

        let action = SyncAction::VideoChange { video_id };
        self.broadcast_to_others(&session_id, member_id, &ServerMessage::SyncAction(action));
    }

    /// Remove a disconnected viewer and tell the remaining members of the
    /// session it was in — and only that session — the new count.
    fn handle_disconnect(&mut self, member_id: MemberId) {
        self.peers.remove(&member_id);
        if let Some((session_id, count)) = self.registry.leave(member_id) {
            info!("viewer {member_id:?} left session {session_id} ({count} watching)");
            self.broadcast_to_session(&session_id, &ServerMessage::UserCount { count });
        } else {
            info!("viewer {member_id:?} disconnected before joining");
        }
    }

    /// Send a message to a specific viewer. Silently ignores write errors
    /// (the reader thread will detect the broken pipe).
    fn send_to(&mut self, member_id: MemberId, msg: &ServerMessage) {
        if let Some(peer) = self.peers.get_mut(&member_id) {
            let _ = send_message(&mut peer.writer, msg);
        }
    }

    /// Send to every member of a session.
    fn broadcast_to_session(&mut self, session_id: &SessionId, msg: &ServerMessage) {
        for member_id in self.registry.members_of(session_id) {
            self.send_to(member_id, msg);
        }
    }

    /// Send to every member of a session except the originator. Actions
    /// are never echoed back — the sender has already applied its own
    /// action locally.
    fn broadcast_to_others(&mut self, session_id: &SessionId, sender: MemberId, msg: &ServerMessage) {
        for member_id in self.registry.members_of(session_id) {
            if member_id != sender {
                self.send_to(member_id, msg);
            }
        }
    }
}

/// A playback position is valid when it is finite and non-negative.
fn valid_time(t: f64) -> bool {
    t.is_finite() && t >= 0.0
}

/// Serialize a `ServerMessage` to JSON and write it with length-delimited
/// framing. Returns any I/O error (caller decides whether to log or drop).
fn send_message(
    writer: &mut BufWriter<TcpStream>,
    msg: &ServerMessage,
) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_vec(msg)?;
    write_message(writer, &json)?;
    Ok(())
}
