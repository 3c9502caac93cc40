//! Core types for Yapcast

use serde::{Deserialize, Serialize};

/// The closed set of supported platforms.
///
/// Dispatch is always over this enum, never over strings; an unknown
/// platform cannot be represented. The declaration order is the fixed
/// enumeration order used wherever connected platforms are listed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Mastodon,
    Threads,
    Bluesky,
}

impl Platform {
    /// All platforms in the fixed enumeration order.
    pub const ALL: [Platform; 3] = [Platform::Mastodon, Platform::Threads, Platform::Bluesky];

    /// Lowercase identifier used in storage keys and CLI arguments.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Mastodon => "mastodon",
            Platform::Threads => "threads",
            Platform::Bluesky => "bluesky",
        }
    }

    /// Human-facing name used in messages ("Mastodon account not connected").
    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::Mastodon => "Mastodon",
            Platform::Threads => "Threads",
            Platform::Bluesky => "Bluesky",
        }
    }

    /// Hard character limit for a single post.
    pub fn character_limit(&self) -> usize {
        match self {
            Platform::Mastodon => 500,
            Platform::Threads => 500,
            Platform::Bluesky => 300,
        }
    }

    /// Maximum number of image attachments per post.
    pub fn max_images(&self) -> usize {
        match self {
            Platform::Mastodon => 4,
            Platform::Threads => 1,
            Platform::Bluesky => 4,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mastodon" => Ok(Platform::Mastodon),
            "threads" => Ok(Platform::Threads),
            "bluesky" => Ok(Platform::Bluesky),
            _ => Err(format!(
                "Unknown platform: '{}'. Valid options: mastodon, threads, bluesky",
                s
            )),
        }
    }
}

/// Effective character limit for a composition targeting several platforms.
///
/// The active limit is the minimum across all selected platforms; `None`
/// when no platform is selected.
pub fn effective_character_limit(platforms: &[Platform]) -> Option<usize> {
    platforms.iter().map(|p| p.character_limit()).min()
}

/// Supported image MIME types for attachments
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ImageMimeType {
    Jpeg,
    Png,
    Gif,
    WebP,
}

impl ImageMimeType {
    /// Parse MIME type from a MIME string (e.g., "image/jpeg")
    pub fn from_mime_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/gif" => Some(Self::Gif),
            "image/webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Detect MIME type from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Get the MIME type string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::WebP => "image/webp",
        }
    }
}

impl std::fmt::Display for ImageMimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A raw image attachment held in memory until the posters upload it.
#[derive(Debug, Clone)]
pub struct ImageData {
    pub bytes: Vec<u8>,
    pub mime: ImageMimeType,
    pub file_name: String,
}

/// One user-authored composition, fanned out to the selected platforms.
#[derive(Debug, Clone)]
pub struct PostContent {
    pub text: String,
    pub platforms: Vec<Platform>,
    pub images: Vec<ImageData>,
}

impl PostContent {
    pub fn new(text: impl Into<String>, platforms: Vec<Platform>) -> Self {
        Self {
            text: text.into(),
            platforms,
            images: Vec::new(),
        }
    }
}

/// Lifecycle state of a single platform's posting attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Pending,
    Posting,
    Completed,
    Failed,
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AttemptStatus::Pending => "pending",
            AttemptStatus::Posting => "posting",
            AttemptStatus::Completed => "completed",
            AttemptStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Result of posting to a single platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostAttemptResult {
    pub platform: Platform,
    pub status: AttemptStatus,
    pub success: bool,
    /// Platform-native post identifier (Mastodon status id, Threads media id,
    /// Bluesky AT-URI)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
    /// User-facing permalink, when the platform provides or implies one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PostAttemptResult {
    pub fn pending(platform: Platform) -> Self {
        Self {
            platform,
            status: AttemptStatus::Pending,
            success: false,
            post_id: None,
            post_url: None,
            error: None,
        }
    }

    pub fn posting(platform: Platform) -> Self {
        Self {
            status: AttemptStatus::Posting,
            ..Self::pending(platform)
        }
    }

    pub fn completed(platform: Platform, post_id: String, post_url: Option<String>) -> Self {
        Self {
            platform,
            status: AttemptStatus::Completed,
            success: true,
            post_id: Some(post_id),
            post_url,
            error: None,
        }
    }

    pub fn failed(platform: Platform, error: impl Into<String>) -> Self {
        Self {
            platform,
            status: AttemptStatus::Failed,
            success: false,
            post_id: None,
            post_url: None,
            error: Some(error.into()),
        }
    }
}

/// Aggregate outcome of one fan-out, in the order the platforms were selected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostOutcome {
    pub results: Vec<PostAttemptResult>,
    /// Flat `"platform: message"` strings for every failed attempt
    pub errors: Vec<String>,
    pub is_posting: bool,
}

/// Derived classification of a `PostOutcome`, used only to pick the summary
/// message; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    AllSucceeded,
    Partial { succeeded: usize, failed: usize },
    AllFailed,
}

impl PostOutcome {
    pub fn kind(&self) -> OutcomeKind {
        let succeeded = self.results.iter().filter(|r| r.success).count();
        let failed = self.results.len() - succeeded;

        if failed == 0 && succeeded > 0 {
            OutcomeKind::AllSucceeded
        } else if succeeded > 0 {
            OutcomeKind::Partial { succeeded, failed }
        } else {
            OutcomeKind::AllFailed
        }
    }

    pub fn summary(&self) -> String {
        match self.kind() {
            OutcomeKind::AllSucceeded => format!(
                "Posted to {} platform(s)",
                self.results.len()
            ),
            OutcomeKind::Partial { succeeded, failed } => format!(
                "Posted to {} platform(s), {} failed",
                succeeded, failed
            ),
            OutcomeKind::AllFailed => "Posting failed on all platforms".to_string(),
        }
    }
}

/// Cached reply count for a published post, keyed by `(platform, post_id)`.
///
/// This is a collaborator contract for the notification layer; the core only
/// defines the shape and its persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyCount {
    pub platform: Platform,
    pub post_id: String,
    pub count: u64,
    pub fetched_at: i64,
    pub unread: bool,
}
