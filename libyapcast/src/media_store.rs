//! External object store client
//!
//! Threads' Graph API only accepts hosted image URLs, so image bytes are
//! first pushed to an external object store collaborator that returns a
//! public URL plus a deletion key. The store is addressed through two
//! configured endpoints (upload, delete); its internals are not our concern.

use reqwest::multipart;
use tracing::debug;

use crate::config::MediaStoreConfig;
use crate::error::PlatformError;
use crate::platforms::http_client;
use crate::types::ImageData;

/// A hosted object: public URL for the platform, key for later deletion.
#[derive(Debug, Clone)]
pub struct StoredMedia {
    pub url: String,
    pub key: String,
}

#[derive(Clone)]
pub struct MediaStoreClient {
    http: reqwest::Client,
    upload_url: String,
    delete_url: String,
}

impl MediaStoreClient {
    pub fn new(config: &MediaStoreConfig) -> Self {
        Self {
            http: http_client(),
            upload_url: config.upload_url.clone(),
            delete_url: config.delete_url.clone(),
        }
    }

    /// Upload raw image bytes, returning the public URL and deletion key.
    pub async fn upload(&self, image: &ImageData) -> Result<StoredMedia, PlatformError> {
        let part = multipart::Part::bytes(image.bytes.clone())
            .file_name(image.file_name.clone())
            .mime_str(image.mime.as_str())
            .map_err(|e| PlatformError::Posting(format!("Invalid MIME type: {}", e)))?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| PlatformError::Network(format!("Media upload failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            return Err(PlatformError::Posting(
                body["error"]
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Media upload failed: HTTP {}", status)),
            ));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PlatformError::Posting(format!("Invalid upload response: {}", e)))?;

        let url = body["url"]
            .as_str()
            .ok_or_else(|| PlatformError::Posting("No url in upload response".to_string()))?
            .to_string();
        let key = body["key"]
            .as_str()
            .ok_or_else(|| PlatformError::Posting("No key in upload response".to_string()))?
            .to_string();

        debug!("Uploaded {} to media store as {}", image.file_name, key);
        Ok(StoredMedia { url, key })
    }

    /// Delete a previously uploaded object by key.
    pub async fn delete(&self, key: &str) -> Result<(), PlatformError> {
        let response = self
            .http
            .delete(&self.delete_url)
            .json(&serde_json::json!({ "key": key }))
            .send()
            .await
            .map_err(|e| PlatformError::Network(format!("Media delete failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(PlatformError::Posting(format!(
                "Media delete failed: HTTP {}",
                response.status()
            )));
        }

        debug!("Deleted media store object {}", key);
        Ok(())
    }
}
