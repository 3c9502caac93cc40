//! Mastodon platform poster
//!
//! Posts statuses through the Mastodon REST API using the stored OAuth
//! session. Media goes up first (sequentially, one request per image); the
//! v2 media endpoint answers 202 while the instance is still processing, in
//! which case the media status endpoint is polled at a fixed interval until
//! a playable URL appears or the attempt budget runs out.
//!
//! Image policy: a partially failed batch still posts with the media ids
//! that made it, but if every requested image failed the post is a hard
//! failure carrying the aggregated upload errors.

use async_trait::async_trait;
use reqwest::multipart;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::PlatformError;
use crate::platforms::{api_error_message, http_client, wrong_session, Poster};
use crate::session::{MastodonSession, Session};
use crate::types::{ImageData, Platform, PostAttemptResult};

/// Interval between media processing polls
const MEDIA_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Attempt budget for the media processing poll
const MEDIA_POLL_ATTEMPTS: u32 = 30;

pub struct MastodonPoster {
    http: reqwest::Client,
    poll_interval: Duration,
    max_poll_attempts: u32,
}

impl Default for MastodonPoster {
    fn default() -> Self {
        Self::new()
    }
}

impl MastodonPoster {
    pub fn new() -> Self {
        Self {
            http: http_client(),
            poll_interval: MEDIA_POLL_INTERVAL,
            max_poll_attempts: MEDIA_POLL_ATTEMPTS,
        }
    }

    /// Upload one image and wait until the instance reports it playable.
    async fn upload_media(
        &self,
        session: &MastodonSession,
        image: &ImageData,
    ) -> Result<String, PlatformError> {
        let part = multipart::Part::bytes(image.bytes.clone())
            .file_name(image.file_name.clone())
            .mime_str(image.mime.as_str())
            .map_err(|e| PlatformError::Posting(format!("Invalid MIME type: {}", e)))?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(format!("{}/api/v2/media", session.instance))
            .bearer_auth(&session.access_token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| PlatformError::Network(format!("Media upload failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            return Err(PlatformError::Posting(api_error_message(status, &body)));
        }

        let still_processing = status == reqwest::StatusCode::ACCEPTED;
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PlatformError::Posting(format!("Invalid media response: {}", e)))?;

        let media_id = body["id"]
            .as_str()
            .ok_or_else(|| PlatformError::Posting("No media id in response".to_string()))?
            .to_string();

        if !still_processing && body["url"].as_str().is_some() {
            return Ok(media_id);
        }

        self.await_media_processed(session, &media_id).await?;
        Ok(media_id)
    }

    /// Poll the media status endpoint until a URL appears.
    async fn await_media_processed(
        &self,
        session: &MastodonSession,
        media_id: &str,
    ) -> Result<(), PlatformError> {
        for attempt in 1..=self.max_poll_attempts {
            sleep(self.poll_interval).await;

            let response = self
                .http
                .get(format!("{}/api/v1/media/{}", session.instance, media_id))
                .bearer_auth(&session.access_token)
                .send()
                .await
                .map_err(|e| PlatformError::Network(format!("Media status check failed: {}", e)))?;

            let status = response.status();
            if status == reqwest::StatusCode::OK {
                let body: serde_json::Value = response.json().await.unwrap_or_default();
                if body["url"].as_str().is_some() {
                    debug!("Media {} processed after {} poll(s)", media_id, attempt);
                    return Ok(());
                }
            } else if status != reqwest::StatusCode::PARTIAL_CONTENT {
                let body: serde_json::Value = response.json().await.unwrap_or_default();
                return Err(PlatformError::Posting(api_error_message(status, &body)));
            }
            // 206 means the instance is still processing; keep waiting
        }

        Err(PlatformError::MediaProcessing(format!(
            "Media {} still processing after {} attempts",
            media_id, self.max_poll_attempts
        )))
    }

    async fn create_status(
        &self,
        session: &MastodonSession,
        text: &str,
        media_ids: &[String],
    ) -> Result<(String, Option<String>), PlatformError> {
        let mut body = serde_json::json!({
            "status": text,
            "visibility": "public",
        });
        if !media_ids.is_empty() {
            body["media_ids"] = serde_json::json!(media_ids);
        }

        let response = self
            .http
            .post(format!("{}/api/v1/statuses", session.instance))
            .bearer_auth(&session.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| PlatformError::Network(format!("Status post failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            return Err(PlatformError::Posting(api_error_message(status, &body)));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PlatformError::Posting(format!("Invalid status response: {}", e)))?;

        let post_id = body["id"]
            .as_str()
            .ok_or_else(|| PlatformError::Posting("No status id in response".to_string()))?
            .to_string();
        let post_url = body["url"].as_str().map(str::to_string);

        Ok((post_id, post_url))
    }

    async fn run(
        &self,
        session: &MastodonSession,
        text: &str,
        images: &[ImageData],
    ) -> Result<(String, Option<String>), PlatformError> {
        let mut media_ids = Vec::new();
        let mut upload_errors = Vec::new();

        for image in images {
            match self.upload_media(session, image).await {
                Ok(id) => media_ids.push(id),
                Err(e) => {
                    warn!("Mastodon media upload failed for {}: {}", image.file_name, e);
                    upload_errors.push(format!("{}: {}", image.file_name, e));
                }
            }
        }

        if !images.is_empty() && media_ids.is_empty() {
            return Err(PlatformError::Posting(format!(
                "All image uploads failed: {}",
                upload_errors.join("; ")
            )));
        }

        self.create_status(session, text, &media_ids).await
    }
}

#[async_trait]
impl Poster for MastodonPoster {
    fn platform(&self) -> Platform {
        Platform::Mastodon
    }

    async fn post(&self, session: &Session, text: &str, images: &[ImageData]) -> PostAttemptResult {
        let session = match session {
            Session::Mastodon(s) => s,
            _ => return wrong_session(Platform::Mastodon),
        };

        match self.run(session, text, images).await {
            Ok((post_id, post_url)) => {
                debug!("Posted to Mastodon: {}", post_id);
                PostAttemptResult::completed(Platform::Mastodon, post_id, post_url)
            }
            Err(e) => PostAttemptResult::failed(Platform::Mastodon, e.to_string()),
        }
    }

    async fn verify_connection(&self, session: &Session) -> bool {
        let session = match session {
            Session::Mastodon(s) => s,
            _ => return false,
        };

        match self
            .http
            .get(format!(
                "{}/api/v1/accounts/verify_credentials",
                session.instance
            ))
            .bearer_auth(&session.access_token)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!("Mastodon connection verification failed: {}", e);
                false
            }
        }
    }
}
