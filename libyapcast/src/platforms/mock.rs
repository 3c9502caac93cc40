//! Mock poster for testing
//!
//! A configurable poster simulating success, failure, and latency, used to
//! exercise the orchestrator without credentials or network access.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use crate::platforms::Poster;
use crate::session::Session;
use crate::types::{ImageData, Platform, PostAttemptResult};

#[derive(Debug, Clone)]
pub struct MockConfig {
    pub platform: Platform,
    pub post_succeeds: bool,
    pub post_error: Option<String>,
    pub connection_ok: bool,
    /// Simulated network latency per call
    pub delay: Duration,
    /// Panic inside `post` to exercise the orchestrator's dispatch boundary
    pub panic_on_post: bool,
}

impl MockConfig {
    fn new(platform: Platform) -> Self {
        Self {
            platform,
            post_succeeds: true,
            post_error: None,
            connection_ok: true,
            delay: Duration::ZERO,
            panic_on_post: false,
        }
    }
}

pub struct MockPoster {
    config: MockConfig,
    post_calls: Arc<Mutex<usize>>,
    posted_text: Arc<Mutex<Vec<String>>>,
}

impl MockPoster {
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            post_calls: Arc::new(Mutex::new(0)),
            posted_text: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A poster that always succeeds
    pub fn success(platform: Platform) -> Self {
        Self::new(MockConfig::new(platform))
    }

    /// A poster that always fails with `error`
    pub fn failure(platform: Platform, error: &str) -> Self {
        Self::new(MockConfig {
            post_succeeds: false,
            post_error: Some(error.to_string()),
            ..MockConfig::new(platform)
        })
    }

    /// A successful poster with simulated latency
    pub fn with_delay(platform: Platform, delay: Duration) -> Self {
        Self::new(MockConfig {
            delay,
            ..MockConfig::new(platform)
        })
    }

    /// A poster that panics, for dispatch-boundary tests
    pub fn panicking(platform: Platform) -> Self {
        Self::new(MockConfig {
            panic_on_post: true,
            ..MockConfig::new(platform)
        })
    }

    pub fn post_call_count(&self) -> usize {
        *self.post_calls.lock().unwrap()
    }

    pub fn posted_text(&self) -> Vec<String> {
        self.posted_text.lock().unwrap().clone()
    }
}

#[async_trait]
impl Poster for MockPoster {
    fn platform(&self) -> Platform {
        self.config.platform
    }

    async fn post(
        &self,
        _session: &Session,
        text: &str,
        _images: &[ImageData],
    ) -> PostAttemptResult {
        *self.post_calls.lock().unwrap() += 1;

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        if self.config.panic_on_post {
            panic!("mock poster panic");
        }

        if self.config.post_succeeds {
            self.posted_text.lock().unwrap().push(text.to_string());
            let post_id = format!("{}:mock-{}", self.config.platform, uuid::Uuid::new_v4());
            let post_url = format!("https://example.com/{}/{}", self.config.platform, post_id);
            PostAttemptResult::completed(self.config.platform, post_id, Some(post_url))
        } else {
            let error = self
                .config
                .post_error
                .clone()
                .unwrap_or_else(|| "Mock posting failed".to_string());
            PostAttemptResult::failed(self.config.platform, error)
        }
    }

    async fn verify_connection(&self, _session: &Session) -> bool {
        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }
        self.config.connection_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::BlueskySession;

    fn any_session() -> Session {
        Session::Bluesky(BlueskySession {
            did: "did:plc:mock".to_string(),
            handle: "mock.bsky.social".to_string(),
            active: true,
        })
    }

    #[tokio::test]
    async fn test_mock_success_records_text() {
        let poster = MockPoster::success(Platform::Mastodon);

        let result = poster.post(&any_session(), "Test content", &[]).await;
        assert!(result.success);
        assert!(result.post_id.unwrap().starts_with("mastodon:mock-"));
        assert_eq!(poster.post_call_count(), 1);
        assert_eq!(poster.posted_text(), vec!["Test content".to_string()]);
    }

    #[tokio::test]
    async fn test_mock_failure_carries_error() {
        let poster = MockPoster::failure(Platform::Threads, "Network down");

        let result = poster.post(&any_session(), "Test", &[]).await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Network down"));
    }

    #[tokio::test]
    async fn test_mock_delay_is_observed() {
        let poster = MockPoster::with_delay(Platform::Bluesky, Duration::from_millis(50));

        let start = std::time::Instant::now();
        poster.post(&any_session(), "Test", &[]).await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_mock_verify_connection() {
        let poster = MockPoster::success(Platform::Mastodon);
        assert!(poster.verify_connection(&any_session()).await);

        let mut config = MockConfig::new(Platform::Mastodon);
        config.connection_ok = false;
        let poster = MockPoster::new(config);
        assert!(!poster.verify_connection(&any_session()).await);
    }
}
