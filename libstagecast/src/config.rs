//! Configuration management for Stagecast
//!
//! Non-secret settings (database path, platform endpoints, webhook
//! destination, poll interval) come from a TOML config file. Secrets
//! (platform client id/secret pairs, the encryption key, the webhook bot
//! token) come from environment variables and are loaded once into
//! [`Secrets`] at process start, then passed by reference.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{ConfigError, Result};
use crate::types::Platform;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub mastodon: Option<PlatformConfig>,
    #[serde(default)]
    pub bluesky: Option<PlatformConfig>,
    #[serde(default)]
    pub notifier: Option<NotifierConfig>,
    #[serde(default)]
    pub scheduling: SchedulingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

/// Endpoints for one platform's API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub enabled: bool,
    /// OAuth token endpoint used for the refresh leg
    pub token_url: String,
    /// Base URL for the publish API
    pub api_base: String,
}

/// Chat-bot webhook destination for terminal-failure notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Webhook API base, e.g. "https://api.telegram.org"
    pub api_base: String,
    /// Destination chat/channel id
    pub chat_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingConfig {
    /// Seconds between daemon catch-up polls
    pub poll_interval: u64,
    /// Minimum separation between a recurring fire and an existing
    /// scheduled item on the same platform, in minutes
    pub min_separation_minutes: i64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            poll_interval: 60,
            min_separation_minutes: 15,
        }
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: "~/.local/share/stagecast/items.db".to_string(),
            },
            mastodon: Some(PlatformConfig {
                enabled: true,
                token_url: "https://mastodon.social/oauth/token".to_string(),
                api_base: "https://mastodon.social".to_string(),
            }),
            bluesky: Some(PlatformConfig {
                enabled: false,
                token_url: "https://bsky.social/oauth/token".to_string(),
                api_base: "https://bsky.social".to_string(),
            }),
            notifier: None,
            scheduling: SchedulingConfig::default(),
        }
    }

    /// Endpoints for a platform, if it is enabled
    pub fn platform(&self, platform: Platform) -> Option<&PlatformConfig> {
        let config = match platform {
            Platform::Mastodon => self.mastodon.as_ref(),
            Platform::Bluesky => self.bluesky.as_ref(),
        };
        config.filter(|c| c.enabled)
    }
}

/// Per-platform OAuth client id/secret pair
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Secrets loaded from the environment once at process start
pub struct Secrets {
    /// Base64-encoded 32-byte encryption key
    pub encryption_key: String,
    clients: HashMap<Platform, ClientCredentials>,
    pub webhook_token: Option<String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("platforms", &self.clients.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Secrets {
    /// Read secrets from the environment
    ///
    /// The encryption key is required; platform client pairs and the
    /// webhook token are optional here and surface as typed errors at the
    /// point of use.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingVar` if `STAGECAST_ENCRYPTION_KEY` is
    /// not set.
    pub fn from_env() -> Result<Self> {
        let encryption_key = std::env::var("STAGECAST_ENCRYPTION_KEY")
            .map_err(|_| ConfigError::MissingVar("STAGECAST_ENCRYPTION_KEY".to_string()))?;

        let mut clients = HashMap::new();
        for platform in Platform::all() {
            let prefix = format!("STAGECAST_{}", platform.as_str().to_uppercase());
            let id = std::env::var(format!("{}_CLIENT_ID", prefix)).ok();
            let secret = std::env::var(format!("{}_CLIENT_SECRET", prefix)).ok();
            if let (Some(client_id), Some(client_secret)) = (id, secret) {
                clients.insert(
                    platform,
                    ClientCredentials {
                        client_id,
                        client_secret,
                    },
                );
            }
        }

        let webhook_token = std::env::var("STAGECAST_WEBHOOK_TOKEN").ok();

        Ok(Self {
            encryption_key,
            clients,
            webhook_token,
        })
    }

    /// Build a Secrets instance directly (tests, embedding)
    pub fn new(
        encryption_key: String,
        clients: HashMap<Platform, ClientCredentials>,
        webhook_token: Option<String>,
    ) -> Self {
        Self {
            encryption_key,
            clients,
            webhook_token,
        }
    }

    /// Client id/secret pair for a platform, if configured
    pub fn client_credentials(&self, platform: Platform) -> Option<&ClientCredentials> {
        self.clients.get(&platform)
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("STAGECAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("stagecast").join("config.toml"))
}
