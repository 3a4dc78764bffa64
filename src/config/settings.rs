//! Application settings
//!
//! Secrets are never stored in the config file itself; the file names the
//! environment variables that carry them, following the same indirection the
//! credential records use for encrypted tokens.

use crate::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// OAuth client settings for the tracker's token endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthSettings {
    /// OAuth client ID registered with the tracker
    pub client_id: String,

    /// Environment variable holding the OAuth client secret
    pub client_secret_env: String,

    /// Token exchange endpoint
    pub token_url: String,
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret_env: "TICKETBRIDGE_OAUTH_CLIENT_SECRET".to_string(),
            token_url: "https://auth.atlassian.com/oauth/token".to_string(),
        }
    }
}

impl OAuthSettings {
    /// Resolve the client secret from the environment
    pub fn client_secret(&self) -> Result<String> {
        std::env::var(&self.client_secret_env).map_err(|_| {
            BridgeError::Config(format!(
                "OAuth client secret env var not set: {}",
                self.client_secret_env
            ))
        })
    }
}

/// Webhook defaults for the single-tenant ("main") deployment mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookDefaults {
    /// Environment variable holding the default shared webhook secret,
    /// used when the inbound request carries no tenant parameter
    pub default_secret_env: String,
}

impl Default for WebhookDefaults {
    fn default() -> Self {
        Self {
            default_secret_env: "TICKETBRIDGE_WEBHOOK_SECRET".to_string(),
        }
    }
}

impl WebhookDefaults {
    /// Resolve the default webhook secret, if configured
    pub fn default_secret(&self) -> Option<String> {
        std::env::var(&self.default_secret_env).ok()
    }
}

/// Provider cache TTLs
///
/// OAuth-backed providers live shorter than static-token providers: an OAuth
/// token can be invalidated server-side between requests, a static API token
/// cannot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    pub oauth_ttl_secs: u64,
    pub api_token_ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            oauth_ttl_secs: 240,
            api_token_ttl_secs: 300,
        }
    }
}

/// Credential encryption key indirection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionSettings {
    /// Environment variable holding the encryption key material
    pub key_env: String,
}

impl Default for EncryptionSettings {
    fn default() -> Self {
        Self {
            key_env: "TICKETBRIDGE_ENCRYPTION_KEY".to_string(),
        }
    }
}

impl EncryptionSettings {
    /// Resolve the key material from the environment
    pub fn key(&self) -> Result<String> {
        std::env::var(&self.key_env).map_err(|_| {
            BridgeError::Config(format!("Encryption key env var not set: {}", self.key_env))
        })
    }
}

/// Top-level application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Address the webhook server binds to
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default)]
    pub oauth: OAuthSettings,

    #[serde(default)]
    pub webhook: WebhookDefaults,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub encryption: EncryptionSettings,
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            oauth: OAuthSettings::default(),
            webhook: WebhookDefaults::default(),
            cache: CacheSettings::default(),
            encryption: EncryptionSettings::default(),
        }
    }
}

impl AppConfig {
    /// Default config file location (~/.config/ticketbridge/config.yaml)
    pub fn default_path() -> PathBuf {
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".config");
        path.push("ticketbridge");
        path.push("config.yaml");
        path
    }

    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load from the given path, or fall back to defaults if the file is absent
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => {
                let default = Self::default_path();
                if default.exists() {
                    Self::load(&default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Save configuration to a YAML file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_yaml::to_string(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}
