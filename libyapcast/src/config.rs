//! Configuration management for Yapcast

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub mastodon: MastodonAppConfig,
    #[serde(default)]
    pub threads: ThreadsAppConfig,
    #[serde(default)]
    pub bluesky: BlueskyAppConfig,
    /// External object store used to host Threads images. Without it,
    /// Threads image posts fail with a configuration message.
    pub media_store: Option<MediaStoreConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.local/share/yapcast".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MastodonAppConfig {
    pub client_name: String,
    pub website: String,
    pub redirect_uri: String,
    pub scopes: String,
}

impl Default for MastodonAppConfig {
    fn default() -> Self {
        Self {
            client_name: "Yapcast".to_string(),
            website: "https://yapcast.app".to_string(),
            redirect_uri: "http://127.0.0.1:8787/auth/mastodon/callback".to_string(),
            scopes: "read write:statuses write:media".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadsAppConfig {
    /// Meta app id; required before Threads login works.
    pub app_id: String,
    pub app_secret: String,
    pub redirect_uri: String,
    /// Threads Graph API base
    pub api_base: String,
    /// Facebook Graph base used for the code-for-token exchange
    pub graph_base: String,
    pub api_version: String,
    /// Delay between container creation and publish. Inherited from observed
    /// platform behavior, not a documented guarantee; kept configurable.
    pub publish_delay_secs: u64,
    /// Sessions with less remaining lifetime than this are refreshed in the
    /// background on load.
    pub refresh_threshold_hours: i64,
}

impl Default for ThreadsAppConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            app_secret: String::new(),
            redirect_uri: "http://127.0.0.1:8787/auth/threads/callback".to_string(),
            api_base: "https://graph.threads.net".to_string(),
            graph_base: "https://graph.facebook.com/v23.0".to_string(),
            api_version: "v1.0".to_string(),
            publish_delay_secs: 5,
            refresh_threshold_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueskyAppConfig {
    /// Service used to resolve handles and as the default authorization server
    pub handle_resolver: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub plc_directory: String,
}

impl Default for BlueskyAppConfig {
    fn default() -> Self {
        Self {
            handle_resolver: "https://bsky.social".to_string(),
            client_id: "https://yapcast.app/.well-known/oauth-client-metadata".to_string(),
            redirect_uri: "http://127.0.0.1:8787/auth/bluesky/callback".to_string(),
            plc_directory: "https://plc.directory".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaStoreConfig {
    pub upload_url: String,
    pub delete_url: String,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        if !config_path.exists() {
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Write configuration to the default location
    pub fn save(&self) -> Result<()> {
        let config_path = resolve_config_path()?;
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::ReadError)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| {
            ConfigError::MissingField(format!("failed to serialize config: {}", e))
        })?;
        std::fs::write(&config_path, content).map_err(ConfigError::ReadError)?;
        Ok(())
    }

    /// Resolve the data directory, expanding `~` and environment variables
    pub fn data_dir(&self) -> Result<PathBuf> {
        let expanded = shellexpand::full(&self.storage.data_dir)
            .map_err(|e| ConfigError::MissingField(format!("storage.data_dir: {}", e)))?;
        Ok(PathBuf::from(expanded.to_string()))
    }

    /// Path of the persisted session store blob
    pub fn sessions_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("sessions.json"))
    }

    /// Path of the OAuth vault blob (Bluesky cryptographic sessions)
    pub fn vault_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("bluesky_vault.json"))
    }

    /// Path of the reply-count cache blob
    pub fn reply_counts_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("reply_counts.json"))
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("YAPCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("yapcast").join("config.toml"))
}
