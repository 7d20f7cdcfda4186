// TCP client for connecting to the sync relay.
//
// Provides a non-blocking interface for a viewer's main thread:
// - `connect()` performs the TCP connect on the calling thread, then
//   spawns a background reader thread.
// - The reader thread calls `read_message()` in a loop, deserializes
//   `ServerMessage`, and pushes into an `mpsc` channel.
// - The main thread holds a `BufWriter<TcpStream>` for sending.
// - `poll()` drains the inbox non-blocking, returning all queued messages.
//
// This separation ensures the viewer's main thread never blocks on network
// I/O — the guard (`sync.rs`) and the player widget both live on that
// thread. The writer flushes synchronously, acceptable for the small
// messages we send.
//
// There is no handshake: the relay accepts the connection silently and the
// first thing a viewer normally sends is `join_session`, answered with a
// `sync_state` snapshot via the inbox.

use std::io::{BufReader, BufWriter};
use std::net::TcpStream;
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};

use couchsync_protocol::framing::{read_message, write_message};
use couchsync_protocol::message::{ClientMessage, ServerMessage};
use couchsync_protocol::types::SessionId;
use couchsync_protocol::video::VideoId;

/// TCP client for relay communication.
pub struct SyncClient {
    writer: BufWriter<TcpStream>,
    inbox: Receiver<ServerMessage>,
    _reader_thread: Option<JoinHandle<()>>,
}

impl SyncClient {
    /// Connect to a relay server and spawn a reader thread.
    pub fn connect(addr: &str) -> Result<Self, String> {
        let stream = TcpStream::connect(addr).map_err(|e| format!("connect failed: {e}"))?;
        let reader_stream = stream
            .try_clone()
            .map_err(|e| format!("clone failed: {e}"))?;
        let writer = BufWriter::new(stream);

        let (tx, rx) = mpsc::channel();
        let reader_thread = thread::spawn(move || {
            reader_loop(BufReader::new(reader_stream), tx);
        });

        Ok(Self {
            writer,
            inbox: rx,
            _reader_thread: Some(reader_thread),
        })
    }

    /// Join (or switch to) a viewing session. The relay answers with a
    /// `sync_state` snapshot, delivered through `poll()`.
    pub fn join(&mut self, session_id: &SessionId) -> Result<(), String> {
        self.send(&ClientMessage::JoinSession {
            session_id: session_id.clone(),
        })
    }

    /// Report a local play, with the player position if it could be read.
    pub fn send_play(&mut self, current_time: Option<f64>) -> Result<(), String> {
        self.send(&ClientMessage::Play { current_time })
    }

    /// Report a local pause, with the player position if it could be read.
    pub fn send_pause(&mut self, current_time: Option<f64>) -> Result<(), String> {
        self.send(&ClientMessage::Pause { current_time })
    }

    /// Report a local scrub to an absolute position.
    pub fn send_seek(&mut self, current_time: f64) -> Result<(), String> {
        self.send(&ClientMessage::Seek { current_time })
    }

    /// Report a video change. Takes a validated id; the raw string form is
    /// what travels (the relay re-validates all inbound ids).
    pub fn send_video_change(&mut self, video_id: &VideoId) -> Result<(), String> {
        self.send(&ClientMessage::VideoChange {
            video_id: video_id.as_str().into(),
        })
    }

    /// Send a pre-built message. Exposed for callers driving the guard,
    /// which returns `ClientMessage`s ready to send.
    pub fn send(&mut self, msg: &ClientMessage) -> Result<(), String> {
        let json = serde_json::to_vec(msg).map_err(|e| e.to_string())?;
        write_message(&mut self.writer, &json).map_err(|e| e.to_string())
    }

    /// Send Goodbye; the relay treats it like a disconnect.
    pub fn disconnect(&mut self) {
        let _ = self.send(&ClientMessage::Goodbye);
    }

    /// Drain all queued server messages (non-blocking).
    pub fn poll(&self) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = self.inbox.try_recv() {
            messages.push(msg);
        }
        messages
    }
}

/// Reader thread: read framed messages in a loop, push to channel.
fn reader_loop(mut reader: BufReader<TcpStream>, tx: mpsc::Sender<ServerMessage>) {
    while let Ok(bytes) = read_message(&mut reader) {
        match serde_json::from_slice::<ServerMessage>(&bytes) {
            Ok(msg) => {
                if tx.send(msg).is_err() {
                    break; // Main thread dropped the receiver
                }
            }
            Err(_) => break, // Malformed message
        }
    }
}
