// couchsync_relay — watch-together sync relay.
//
// The relay is a thin, authoritative message broker: it accepts TCP
// connections from viewers, tracks the playback state of each viewing
// session (video id, play/pause, position, members), and rebroadcasts
// viewer actions to the other members of the same session. It never
// touches video content — players run entirely on the clients.
//
// Module overview:
// - `session.rs`: `Session` (authoritative playback state, pure data +
//                 mutators) and `SessionRegistry` (all sessions keyed by
//                 id, with the member→session index that scopes
//                 disconnects). No I/O.
// - `server.rs`:  TCP listener, reader threads (one per viewer), and the
//                 main event loop. Uses `std::net` with a
//                 thread-per-reader architecture and an `mpsc` channel to
//                 funnel events into the single-threaded handler.
// - `client.rs`:  `SyncClient` — the viewer side of the connection.
//                 Non-blocking poll interface over a background reader
//                 thread. Lives here (not in a UI crate) because it is
//                 purely std TCP + protocol framing + mpsc.
// - `sync.rs`:    `SyncGuard` and the `MediaPlayer` trait — the
//                 client-side re-entrancy guard that applies remote
//                 actions to the local player widget without re-emitting
//                 them as new user actions.
//
// Dependencies: `couchsync_protocol` (shared message types and framing).
// No dependency on any player widget or UI toolkit.
//
// The relay can run as a standalone binary (`main.rs`) or be embedded in
// another process via the library API (`start_relay`).

pub mod client;
pub mod server;
pub mod session;
pub mod sync;

pub use server::start_relay;
