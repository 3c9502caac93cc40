//! Error types for Yapcast

use thiserror::Error;

pub type Result<T> = std::result::Result<T, YapcastError>;

#[derive(Error, Debug)]
pub enum YapcastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl YapcastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            YapcastError::InvalidInput(_) => 3,
            YapcastError::Auth(_) => 2,
            YapcastError::Platform(PlatformError::Authentication(_)) => 2,
            YapcastError::Platform(_) => 1,
            YapcastError::Config(_) => 1,
            YapcastError::Store(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors surfaced by platform posters and their HTTP plumbing.
///
/// Posters never let these escape their `post` boundary; they are folded
/// into a failed `PostAttemptResult` with the error's display string.
#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Posting failed: {0}")]
    Posting(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Media processing failed: {0}")]
    MediaProcessing(String),
}

/// Errors from the OAuth/token lifecycle managers.
///
/// A failed step leaves prior session state untouched; these propagate to
/// the caller that drove the login flow.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("App registration failed: {0}")]
    Registration(String),

    #[error("Authorization state mismatch")]
    StateMismatch,

    #[error("Token exchange failed: {0}")]
    Exchange(String),

    #[error("Failed to fetch profile: {0}")]
    Profile(String),

    #[error("Session vault error: {0}")]
    Vault(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = YapcastError::InvalidInput("Empty content".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_auth_errors() {
        let error = YapcastError::Auth(AuthError::StateMismatch);
        assert_eq!(error.exit_code(), 2);

        let error = YapcastError::Platform(PlatformError::Authentication(
            "Invalid token".to_string(),
        ));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_platform_errors() {
        let posting = YapcastError::Platform(PlatformError::Posting("failed".to_string()));
        assert_eq!(posting.exit_code(), 1);

        let network = YapcastError::Platform(PlatformError::Network("timeout".to_string()));
        assert_eq!(network.exit_code(), 1);

        let media = YapcastError::Platform(PlatformError::MediaProcessing(
            "poll budget exhausted".to_string(),
        ));
        assert_eq!(media.exit_code(), 1);
    }

    #[test]
    fn test_exit_code_config_and_store() {
        let config = YapcastError::Config(ConfigError::MissingField("storage.data_dir".to_string()));
        assert_eq!(config.exit_code(), 1);

        let store = YapcastError::Store(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "missing",
        )));
        assert_eq!(store.exit_code(), 1);
    }

    #[test]
    fn test_error_message_formatting() {
        let error = YapcastError::InvalidInput("Content cannot be empty".to_string());
        assert_eq!(
            format!("{}", error),
            "Invalid input: Content cannot be empty"
        );

        let error = YapcastError::Platform(PlatformError::Authentication(
            "Mastodon token rejected".to_string(),
        ));
        assert_eq!(
            format!("{}", error),
            "Platform error: Authentication failed: Mastodon token rejected"
        );

        let error = YapcastError::Auth(AuthError::Exchange("HTTP 400".to_string()));
        assert_eq!(
            format!("{}", error),
            "Authentication error: Token exchange failed: HTTP 400"
        );
    }

    #[test]
    fn test_error_conversions() {
        let platform_error = PlatformError::Posting("test".to_string());
        let error: YapcastError = platform_error.into();
        assert!(matches!(error, YapcastError::Platform(_)));

        let auth_error = AuthError::StateMismatch;
        let error: YapcastError = auth_error.into();
        assert!(matches!(error, YapcastError::Auth(_)));

        let store_error = StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "x"));
        let error: YapcastError = store_error.into();
        assert!(matches!(error, YapcastError::Store(_)));
    }

    #[test]
    fn test_platform_error_clone() {
        let original = PlatformError::Network("Connection failed".to_string());
        let cloned = original.clone();
        assert_eq!(format!("{}", original), format!("{}", cloned));
    }

    #[test]
    fn test_state_mismatch_message() {
        let error = AuthError::StateMismatch;
        assert_eq!(format!("{}", error), "Authorization state mismatch");
    }
}
