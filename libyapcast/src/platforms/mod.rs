//! Platform poster abstraction and implementations
//!
//! Each platform implements the [`Poster`] capability: turn text plus
//! optional images into a platform-native post using a stored session.
//! Posters never let errors escape `post` — every failure is folded into a
//! failed [`PostAttemptResult`] with a human-readable message, so callers
//! always receive a well-formed result object.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::session::Session;
use crate::types::{ImageData, Platform, PostAttemptResult};

pub mod bluesky;
pub mod facets;
pub mod mastodon;
pub mod threads;

// Mock poster is available for all builds (not just tests) to support
// integration tests
pub mod mock;

const USER_AGENT: &str = concat!("yapcast/", env!("CARGO_PKG_VERSION"));
const HTTP_TIMEOUT_SECS: u64 = 30;

/// Shared HTTP client configuration for all platform plumbing
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Extract a user-facing message from a platform error response.
///
/// Tries the common envelope shapes (`error` string, `error.message`,
/// `error_message`) and falls back to `HTTP <status>` with the canonical
/// reason phrase.
pub(crate) fn api_error_message(status: reqwest::StatusCode, body: &serde_json::Value) -> String {
    if let Some(msg) = body["error"].as_str() {
        return msg.to_string();
    }
    if let Some(msg) = body["error"]["message"].as_str() {
        return msg.to_string();
    }
    if let Some(msg) = body["error_message"].as_str() {
        return msg.to_string();
    }
    format!(
        "HTTP {}: {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown")
    )
}

/// The poster capability: one implementation per platform.
#[async_trait]
pub trait Poster: Send + Sync {
    /// The platform this poster serves
    fn platform(&self) -> Platform;

    /// Publish `text` (plus optional images) using `session`.
    ///
    /// Never returns an error: all failures, including a session of the
    /// wrong variant, come back as a failed result with an `error` string.
    async fn post(
        &self,
        session: &Session,
        text: &str,
        images: &[ImageData],
    ) -> PostAttemptResult;

    /// Lightweight authenticated probe of the stored session.
    async fn verify_connection(&self, session: &Session) -> bool;
}

/// Map from platform tag to its poster, resolved once at startup.
///
/// The closed [`Platform`] enum plus this registry replace the original
/// switch-on-string dispatch; an unknown platform is unrepresentable.
#[derive(Clone, Default)]
pub struct PosterRegistry {
    posters: HashMap<Platform, Arc<dyn Poster>>,
}

impl PosterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_poster(mut self, poster: Arc<dyn Poster>) -> Self {
        self.posters.insert(poster.platform(), poster);
        self
    }

    pub fn get(&self, platform: Platform) -> Option<Arc<dyn Poster>> {
        self.posters.get(&platform).cloned()
    }

    pub fn len(&self) -> usize {
        self.posters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posters.is_empty()
    }
}

/// Build the registry with the three real posters, resolved once at
/// startup from the configuration and the OAuth vault.
pub fn standard_registry(
    config: &crate::config::Config,
    vault: Arc<dyn crate::auth::vault::SessionVault>,
) -> PosterRegistry {
    let media_store = config
        .media_store
        .as_ref()
        .map(crate::media_store::MediaStoreClient::new);

    PosterRegistry::new()
        .with_poster(Arc::new(mastodon::MastodonPoster::new()))
        .with_poster(Arc::new(threads::ThreadsPoster::new(
            &config.threads,
            media_store,
        )))
        .with_poster(Arc::new(bluesky::BlueskyPoster::new(vault)))
}

/// Failed result for a session stored under the wrong platform tag. Should
/// be unreachable with the typed store, but posters defend anyway.
pub(crate) fn wrong_session(platform: Platform) -> PostAttemptResult {
    PostAttemptResult::failed(
        platform,
        format!("{} account not connected", platform.display_name()),
    )
}
