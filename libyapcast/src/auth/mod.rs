//! OAuth/token lifecycle managers
//!
//! One manager per platform, each driving its own login state machine and
//! owning all mutation of the session store (posters and the orchestrator
//! only ever read). A failed step surfaces an error and leaves prior state
//! unchanged — an existing valid session is never replaced with a broken
//! one. Per the store contract, every mutation here is followed by a
//! `SessionsChanged` broadcast.

pub mod bluesky;
pub mod mastodon;
pub mod threads;
pub mod vault;

pub use bluesky::BlueskyAuth;
pub use mastodon::MastodonAuth;
pub use threads::ThreadsAuth;
pub use vault::{CallbackParams, JsonSessionVault, SessionVault};

/// Minimal percent-encoding for query components
pub(crate) fn urlencode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urlencode_reserved_characters() {
        assert_eq!(
            urlencode("atproto transition:generic"),
            "atproto%20transition%3Ageneric"
        );
        assert_eq!(
            urlencode("http://127.0.0.1:8787/cb"),
            "http%3A%2F%2F127.0.0.1%3A8787%2Fcb"
        );
        assert_eq!(urlencode("plain-safe_chars.ok~"), "plain-safe_chars.ok~");
    }
}
