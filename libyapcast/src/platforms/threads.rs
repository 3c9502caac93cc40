//! Threads platform poster
//!
//! Threads publishes in two phases: create a media container, then publish
//! it by id. Publishing immediately after container creation is known to
//! fail intermittently, so a mandatory delay (configurable, 5 s by default)
//! sits between the phases. The Graph API only accepts hosted image URLs,
//! so an attached image is first pushed to the external media store; the
//! hosted object is deleted again after the attempt, success or failure
//! alike, and a cleanup failure never changes the post outcome.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::ThreadsAppConfig;
use crate::error::PlatformError;
use crate::media_store::{MediaStoreClient, StoredMedia};
use crate::platforms::{api_error_message, http_client, wrong_session, Poster};
use crate::session::{Session, ThreadsSession};
use crate::types::{ImageData, Platform, PostAttemptResult};

pub struct ThreadsPoster {
    http: reqwest::Client,
    api_base: String,
    api_version: String,
    publish_delay: Duration,
    media_store: Option<MediaStoreClient>,
}

impl ThreadsPoster {
    pub fn new(config: &ThreadsAppConfig, media_store: Option<MediaStoreClient>) -> Self {
        Self {
            http: http_client(),
            api_base: config.api_base.clone(),
            api_version: config.api_version.clone(),
            publish_delay: Duration::from_secs(config.publish_delay_secs),
            media_store,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}/{}", self.api_base, self.api_version, path)
    }

    async fn create_container(
        &self,
        session: &ThreadsSession,
        text: &str,
        image_url: Option<&str>,
    ) -> Result<String, PlatformError> {
        let mut form = vec![
            ("access_token", session.access_token.clone()),
            ("text", text.to_string()),
        ];
        match image_url {
            Some(url) => {
                form.push(("media_type", "IMAGE".to_string()));
                form.push(("image_url", url.to_string()));
            }
            None => form.push(("media_type", "TEXT".to_string())),
        }

        let response = self
            .http
            .post(self.endpoint(&format!("{}/threads", session.user.id)))
            .form(&form)
            .send()
            .await
            .map_err(|e| PlatformError::Network(format!("Container creation failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            return Err(PlatformError::Posting(api_error_message(status, &body)));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PlatformError::Posting(format!("Invalid container response: {}", e)))?;

        body["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| PlatformError::Posting("Failed to create media container".to_string()))
    }

    async fn publish_container(
        &self,
        session: &ThreadsSession,
        container_id: &str,
    ) -> Result<String, PlatformError> {
        let form = [
            ("creation_id", container_id.to_string()),
            ("access_token", session.access_token.clone()),
        ];

        let response = self
            .http
            .post(self.endpoint(&format!("{}/threads_publish", session.user.id)))
            .form(&form)
            .send()
            .await
            .map_err(|e| PlatformError::Network(format!("Publish failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            return Err(PlatformError::Posting(api_error_message(status, &body)));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PlatformError::Posting(format!("Invalid publish response: {}", e)))?;

        body["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| PlatformError::Posting("No post id in publish response".to_string()))
    }

    async fn run(
        &self,
        session: &ThreadsSession,
        text: &str,
        images: &[ImageData],
        hosted: &mut Option<StoredMedia>,
    ) -> Result<String, PlatformError> {
        // Threads takes a single image per post; the validator already warns
        // about extras, so only the first is used here.
        if let Some(image) = images.first() {
            let store = self.media_store.as_ref().ok_or_else(|| {
                PlatformError::Posting(
                    "Threads image posts need a configured media_store".to_string(),
                )
            })?;
            *hosted = Some(store.upload(image).await?);
        }

        let image_url = hosted.as_ref().map(|m| m.url.as_str());
        let container_id = self.create_container(session, text, image_url).await?;
        debug!("Created Threads container {}", container_id);

        // Server-side processing window between container creation and
        // publish; skipping it makes the publish fail intermittently.
        sleep(self.publish_delay).await;

        self.publish_container(session, &container_id).await
    }
}

#[async_trait]
impl Poster for ThreadsPoster {
    fn platform(&self) -> Platform {
        Platform::Threads
    }

    async fn post(&self, session: &Session, text: &str, images: &[ImageData]) -> PostAttemptResult {
        let session = match session {
            Session::Threads(s) => s,
            _ => return wrong_session(Platform::Threads),
        };

        let mut hosted: Option<StoredMedia> = None;
        let outcome = self.run(session, text, images, &mut hosted).await;

        // Hosted image cleanup runs regardless of the outcome and never
        // overrides it.
        if let (Some(media), Some(store)) = (hosted.as_ref(), self.media_store.as_ref()) {
            if let Err(e) = store.delete(&media.key).await {
                warn!("Failed to delete hosted Threads image {}: {}", media.key, e);
            }
        }

        match outcome {
            Ok(post_id) => {
                debug!("Posted to Threads: {}", post_id);
                // The API returns a numeric id while post URLs use shortcodes
                // the API does not expose; the profile page is the best
                // permalink available.
                let post_url = format!("https://www.threads.com/@{}", session.user.username);
                PostAttemptResult::completed(Platform::Threads, post_id, Some(post_url))
            }
            Err(e) => PostAttemptResult::failed(Platform::Threads, e.to_string()),
        }
    }

    async fn verify_connection(&self, session: &Session) -> bool {
        let session = match session {
            Session::Threads(s) => s,
            _ => return false,
        };

        let result = self
            .http
            .get(format!("{}/{}/me", self.api_base, self.api_version))
            .query(&[
                ("fields", "id"),
                ("access_token", session.access_token.as_str()),
            ])
            .send()
            .await;

        match result {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!("Threads connection verification failed: {}", e);
                false
            }
        }
    }
}
