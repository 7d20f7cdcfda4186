// Core ID types for the sync protocol.
//
// `SessionId` is the key for a shared viewing session. It travels on the
// wire in `join_session` and is used by the relay's registry
// (`couchsync_relay::session`) to look sessions up. Member/connection ids
// are relay-internal and never serialized, so they live in the relay crate.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Key of a shared viewing session.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// The single shared room clients fall back to when no session is named.
impl Default for SessionId {
    fn default() -> Self {
        Self("room1".into())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
