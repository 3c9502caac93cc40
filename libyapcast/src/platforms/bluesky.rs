//! Bluesky platform poster
//!
//! Posts AT-protocol records through an agent restored from the OAuth vault
//! by DID; no bearer token ever lives in the session store. Text runs
//! through the rich-text facet detector first. An attached image is
//! re-encoded at descending JPEG quality while it exceeds the blob ceiling,
//! uploaded as a blob, and embedded with the aspect ratio decoded from the
//! image itself. The single-image flow treats any image failure as a
//! whole-post failure.

use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use tracing::{debug, warn};

use crate::auth::vault::{AtpAgent, SessionVault};
use crate::error::PlatformError;
use crate::platforms::facets::detect_facets;
use crate::platforms::{wrong_session, Poster};
use crate::session::{BlueskySession, Session};
use crate::types::{ImageData, Platform, PostAttemptResult};

/// Blob size ceiling: 976.56 KB, the limit the PDS enforces on image blobs
const MAX_BLOB_BYTES: usize = 999_997;
/// Starting JPEG quality for the re-encode loop, percent
const COMPRESS_START_QUALITY: u8 = 90;
const COMPRESS_QUALITY_STEP: u8 = 10;
/// Quality floor; the result at this quality is used even if still over
const COMPRESS_QUALITY_FLOOR: u8 = 10;

pub struct BlueskyPoster {
    vault: Arc<dyn SessionVault>,
}

struct PreparedImage {
    bytes: Vec<u8>,
    mime: String,
    width: u32,
    height: u32,
}

impl BlueskyPoster {
    pub fn new(vault: Arc<dyn SessionVault>) -> Self {
        Self { vault }
    }

    async fn run(
        &self,
        agent: &AtpAgent,
        session: &BlueskySession,
        text: &str,
        images: &[ImageData],
    ) -> Result<(String, String), PlatformError> {
        let facets = detect_facets(text, agent).await;

        let embed = match images.first() {
            Some(image) => {
                let prepared = prepare_image(image)?;
                let blob = agent.upload_blob(prepared.bytes, &prepared.mime).await?;
                Some(serde_json::json!({
                    "$type": "app.bsky.embed.images",
                    "images": [{
                        "image": blob,
                        "alt": "",
                        "aspectRatio": {
                            "width": prepared.width,
                            "height": prepared.height,
                        },
                    }],
                }))
            }
            None => None,
        };

        let mut record = serde_json::json!({
            "$type": "app.bsky.feed.post",
            "text": text,
            "createdAt": chrono::Utc::now().to_rfc3339(),
        });
        if !facets.is_empty() {
            record["facets"] = serde_json::json!(facets);
        }
        if let Some(embed) = embed {
            record["embed"] = embed;
        }

        let (uri, _cid) = agent.create_record("app.bsky.feed.post", record).await?;
        let url = permalink(&session.handle, &uri);
        Ok((uri, url))
    }
}

#[async_trait]
impl Poster for BlueskyPoster {
    fn platform(&self) -> Platform {
        Platform::Bluesky
    }

    async fn post(&self, session: &Session, text: &str, images: &[ImageData]) -> PostAttemptResult {
        let session = match session {
            Session::Bluesky(s) => s,
            _ => return wrong_session(Platform::Bluesky),
        };

        let agent = match self.vault.restore(&session.did).await {
            Some(agent) => agent,
            None => {
                return PostAttemptResult::failed(
                    Platform::Bluesky,
                    "Bluesky session expired, reconnect the account",
                )
            }
        };

        match self.run(&agent, session, text, images).await {
            Ok((uri, url)) => {
                debug!("Posted to Bluesky: {}", uri);
                PostAttemptResult::completed(Platform::Bluesky, uri, Some(url))
            }
            Err(e) => PostAttemptResult::failed(Platform::Bluesky, e.to_string()),
        }
    }

    async fn verify_connection(&self, session: &Session) -> bool {
        let session = match session {
            Session::Bluesky(s) => s,
            _ => return false,
        };

        match self.vault.restore(&session.did).await {
            Some(agent) => match agent.get_session().await {
                Ok(_) => true,
                Err(e) => {
                    warn!("Bluesky connection verification failed: {}", e);
                    false
                }
            },
            None => false,
        }
    }
}

/// Permalink from the handle and the AT-URI's trailing record key.
fn permalink(handle: &str, at_uri: &str) -> String {
    let rkey = at_uri.rsplit('/').next().unwrap_or(at_uri);
    format!("https://bsky.app/profile/{}/post/{}", handle, rkey)
}

/// Decode the image for its aspect ratio and bring it under the blob
/// ceiling, re-encoding as JPEG at descending quality when needed.
fn prepare_image(image: &ImageData) -> Result<PreparedImage, PlatformError> {
    let decoded = image::load_from_memory(&image.bytes)
        .map_err(|e| PlatformError::Posting(format!("Failed to decode image: {}", e)))?;
    let (width, height) = (decoded.width(), decoded.height());

    if image.bytes.len() <= MAX_BLOB_BYTES {
        return Ok(PreparedImage {
            bytes: image.bytes.clone(),
            mime: image.mime.as_str().to_string(),
            width,
            height,
        });
    }

    debug!(
        "Image {} is {} bytes, compressing under the {} byte ceiling",
        image.file_name,
        image.bytes.len(),
        MAX_BLOB_BYTES
    );
    let bytes = compress_to_jpeg(&decoded, MAX_BLOB_BYTES)?;
    Ok(PreparedImage {
        bytes,
        mime: "image/jpeg".to_string(),
        width,
        height,
    })
}

/// Re-encode at descending quality until the result fits or the quality
/// floor is reached; the floor result is used regardless of size.
fn compress_to_jpeg(
    decoded: &image::DynamicImage,
    max_bytes: usize,
) -> Result<Vec<u8>, PlatformError> {
    let rgb = decoded.to_rgb8();
    let mut quality = COMPRESS_START_QUALITY;

    loop {
        let mut buf = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(Cursor::new(&mut buf), quality);
        encoder
            .encode_image(&rgb)
            .map_err(|e| PlatformError::Posting(format!("Failed to compress image: {}", e)))?;

        if buf.len() <= max_bytes || quality <= COMPRESS_QUALITY_FLOOR {
            return Ok(buf);
        }
        quality -= COMPRESS_QUALITY_STEP;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::vault::{CallbackParams, VaultIdentity};
    use crate::error::AuthError;
    use crate::session::MastodonSession;
    use crate::types::ImageMimeType;

    /// Vault that never holds a session
    struct EmptyVault;

    #[async_trait]
    impl SessionVault for EmptyVault {
        async fn authorize_url(&self, _handle: &str) -> Result<String, AuthError> {
            Err(AuthError::Vault("not supported".to_string()))
        }

        async fn complete(&self, _params: &CallbackParams) -> Result<VaultIdentity, AuthError> {
            Err(AuthError::Vault("not supported".to_string()))
        }

        async fn restore(&self, _did: &str) -> Option<AtpAgent> {
            None
        }

        async fn remove(&self, _did: &str) -> Result<(), AuthError> {
            Ok(())
        }
    }

    fn bluesky_session() -> Session {
        Session::Bluesky(BlueskySession {
            did: "did:plc:abc".to_string(),
            handle: "erin.bsky.social".to_string(),
            active: true,
        })
    }

    fn png_image(width: u32, height: u32) -> ImageData {
        let img = image::RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        ImageData {
            bytes,
            mime: ImageMimeType::Png,
            file_name: "test.png".to_string(),
        }
    }

    #[tokio::test]
    async fn test_wrong_session_variant_fails_without_network() {
        let poster = BlueskyPoster::new(Arc::new(EmptyVault));
        let session = Session::Mastodon(MastodonSession {
            instance: "https://mastodon.social".to_string(),
            access_token: "t".to_string(),
            user_id: "1".to_string(),
            username: "a".to_string(),
            display_name: "A".to_string(),
            avatar: None,
            created_at: 0,
            expires_at: None,
        });

        let result = poster.post(&session, "hi", &[]).await;
        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("Bluesky account not connected")
        );
    }

    #[tokio::test]
    async fn test_unrestorable_session_fails_with_reconnect_hint() {
        let poster = BlueskyPoster::new(Arc::new(EmptyVault));
        let result = poster.post(&bluesky_session(), "hi", &[]).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("reconnect"));
    }

    #[tokio::test]
    async fn test_verify_connection_absent_session() {
        let poster = BlueskyPoster::new(Arc::new(EmptyVault));
        assert!(!poster.verify_connection(&bluesky_session()).await);
    }

    #[test]
    fn test_permalink_from_at_uri() {
        let uri = "at://did:plc:abc/app.bsky.feed.post/3kabc123";
        assert_eq!(
            permalink("erin.bsky.social", uri),
            "https://bsky.app/profile/erin.bsky.social/post/3kabc123"
        );
    }

    #[test]
    fn test_prepare_small_image_passes_through() {
        let image = png_image(32, 32);
        let original_len = image.bytes.len();

        let prepared = prepare_image(&image).unwrap();
        assert_eq!(prepared.bytes.len(), original_len);
        assert_eq!(prepared.mime, "image/png");
        assert_eq!((prepared.width, prepared.height), (32, 32));
    }

    #[test]
    fn test_prepare_undecodable_image_fails() {
        let image = ImageData {
            bytes: vec![0u8; 64],
            mime: ImageMimeType::Jpeg,
            file_name: "broken.jpg".to_string(),
        };
        assert!(prepare_image(&image).is_err());
    }

    #[test]
    fn test_compress_descends_to_quality_floor() {
        let decoded = image::load_from_memory(&png_image(64, 64).bytes).unwrap();
        // A ceiling no 64x64 JPEG can meet forces the loop to the floor,
        // which must still terminate with a result
        let bytes = compress_to_jpeg(&decoded, 10).unwrap();
        assert!(!bytes.is_empty());
        let reloaded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(reloaded.width(), 64);
    }

    #[test]
    fn test_compress_stops_once_under_ceiling() {
        let decoded = image::load_from_memory(&png_image(256, 256).bytes).unwrap();
        let bytes = compress_to_jpeg(&decoded, MAX_BLOB_BYTES).unwrap();
        assert!(bytes.len() <= MAX_BLOB_BYTES);
        assert!(image::load_from_memory(&bytes).is_ok());
    }
}
