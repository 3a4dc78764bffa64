//! Configuration system
//!
//! Loads ~/.config/ticketbridge/config.yaml with support for:
//! - Server bind address
//! - OAuth client settings for the tracker token exchange
//! - Webhook default secret (environment indirection)
//! - Provider cache TTLs
//! - Credential encryption key (environment indirection)

mod settings;

pub use settings::{
    AppConfig, CacheSettings, EncryptionSettings, OAuthSettings, WebhookDefaults,
};
