// Video identifiers: validation and URL extraction.
//
// External video ids are exactly 11 characters of `[A-Za-z0-9_-]`. The
// `VideoId` newtype can only be constructed through validation, and its
// serde impls go through `TryFrom<String>` — a malformed id can never be
// materialized from the wire. The relay still receives the raw string in
// `video_change` (untrusted input) and validates it with `parse` before
// anything is mutated or broadcast.
//
// `extract` recovers an id from the URL shapes users actually paste:
// watch-page query parameter, short link, embed path, legacy `/v/` path,
// or a bare 11-character token.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Exact length of an external video id.
pub const VIDEO_ID_LEN: usize = 11;

/// URL markers an id can follow, tried in order.
const URL_MARKERS: [&str; 4] = ["v=", "youtu.be/", "embed/", "v/"];

/// A validated 11-character external video id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VideoId(String);

impl VideoId {
    /// Validate a bare token: exactly 11 characters, each alphanumeric,
    /// `-`, or `_`. Returns `None` otherwise.
    pub fn parse(token: &str) -> Option<Self> {
        let bytes = token.as_bytes();
        if bytes.len() != VIDEO_ID_LEN || !bytes.iter().all(|&b| is_id_byte(b)) {
            return None;
        }
        Some(Self(token.into()))
    }

    /// Extract an id from a URL or bare token. Handles `watch?v=`,
    /// `youtu.be/`, `embed/`, `/v/` shapes and trailing query parameters.
    pub fn extract(input: &str) -> Option<Self> {
        let input = input.trim();
        if let Some(id) = Self::parse(input) {
            return Some(id);
        }
        for marker in URL_MARKERS {
            if let Some(pos) = input.find(marker)
                && let Some(id) = take_id(&input[pos + marker.len()..])
            {
                return Some(id);
            }
        }
        None
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for VideoId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid video id: {value:?}"))
    }
}

impl From<VideoId> for String {
    fn from(id: VideoId) -> Self {
        id.0
    }
}

fn is_id_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

/// Take the first 11 bytes of `rest` as an id, if they are all valid id
/// characters. Anything following (e.g. `&t=30s`) is ignored.
fn take_id(rest: &str) -> Option<VideoId> {
    let bytes = rest.as_bytes();
    if bytes.len() < VIDEO_ID_LEN {
        return None;
    }
    let candidate = &bytes[..VIDEO_ID_LEN];
    if !candidate.iter().all(|&b| is_id_byte(b)) {
        return None;
    }
    // All-ASCII by the check above, so the str slice is boundary-safe.
    Some(VideoId(rest[..VIDEO_ID_LEN].into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_exact_token() {
        let id = VideoId::parse("abcdefghijk").unwrap();
        assert_eq!(id.as_str(), "abcdefghijk");
        assert!(VideoId::parse("dQw4w9WgXcQ").is_some());
        assert!(VideoId::parse("a-b_c-d_e-f").is_some());
    }

    #[test]
    fn parse_rejects_wrong_length() {
        assert!(VideoId::parse("").is_none());
        assert!(VideoId::parse("abcdefghij").is_none()); // 10
        assert!(VideoId::parse("abcdefghijkl").is_none()); // 12
    }

    #[test]
    fn parse_rejects_bad_characters() {
        assert!(VideoId::parse("abcde ghijk").is_none());
        assert!(VideoId::parse("abcde/ghijk").is_none());
        assert!(VideoId::parse("abcdéghijk").is_none()); // multibyte
    }

    #[test]
    fn extract_from_watch_url() {
        let id = VideoId::extract("https://www.youtube.com/watch?v=dQw4w9WgXcQ").unwrap();
        assert_eq!(id.as_str(), "dQw4w9WgXcQ");
    }

    #[test]
    fn extract_ignores_trailing_params() {
        let id = VideoId::extract("https://youtube.com/watch?v=dQw4w9WgXcQ&t=30s").unwrap();
        assert_eq!(id.as_str(), "dQw4w9WgXcQ");
    }

    #[test]
    fn extract_from_short_link() {
        let id = VideoId::extract("https://youtu.be/dQw4w9WgXcQ").unwrap();
        assert_eq!(id.as_str(), "dQw4w9WgXcQ");
    }

    #[test]
    fn extract_from_embed_and_v_paths() {
        assert!(VideoId::extract("https://www.youtube.com/embed/dQw4w9WgXcQ").is_some());
        assert!(VideoId::extract("https://www.youtube.com/v/dQw4w9WgXcQ").is_some());
    }

    #[test]
    fn extract_bare_token() {
        assert!(VideoId::extract("dQw4w9WgXcQ").is_some());
        assert!(VideoId::extract("  dQw4w9WgXcQ  ").is_some());
    }

    #[test]
    fn extract_rejects_garbage() {
        assert!(VideoId::extract("not a url").is_none());
        assert!(VideoId::extract("https://example.com/watch?v=short").is_none());
        assert!(VideoId::extract("").is_none());
    }

    #[test]
    fn serde_rejects_malformed_id() {
        let err = serde_json::from_str::<VideoId>("\"too-short\"");
        assert!(err.is_err());
        let ok: VideoId = serde_json::from_str("\"dQw4w9WgXcQ\"").unwrap();
        assert_eq!(ok.as_str(), "dQw4w9WgXcQ");
    }
}
