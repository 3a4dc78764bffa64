//! Credential record types
//!
//! A `TenantCredential` is owned by the tenant and mutated on
//! connect/reconnect/refresh/disconnect. Token fields are stored encrypted;
//! only the provider factory ever sees the plaintext.

use crate::providers::ProviderKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a tenant authenticates against its tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Three-legged OAuth with rotating refresh tokens
    OAuth,

    /// Static API token plus account email (Basic auth)
    ApiToken,
}

/// Per-tenant tracker credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantCredential {
    pub tenant_id: String,

    /// Which tracker this tenant is connected to
    pub provider: ProviderKind,

    pub auth_mode: AuthMode,

    /// OAuth cloud/site identifier (Jira: Atlassian cloud ID)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud_id: Option<String>,

    /// Site base URL (Zendesk subdomain URL, or Jira site for API tokens)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud_url: Option<String>,

    /// Account email for Basic auth (API token mode)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_email: Option<String>,

    /// Jira project key tickets are created under
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_key: Option<String>,

    /// Encrypted access token (OAuth) or static API token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token_enc: Option<String>,

    /// Encrypted refresh token (OAuth only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token_enc: Option<String>,

    /// Access token expiry (OAuth only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_expiry: Option<DateTime<Utc>>,

    /// Encrypted tenant-scoped webhook secret
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_secret_enc: Option<String>,

    pub connected: bool,
}

impl TenantCredential {
    /// Whether this record can produce a working provider.
    ///
    /// OAuth requires a cloud ID and both token fields; API-token mode
    /// requires the site URL, account email, and the static token.
    pub fn is_usable(&self) -> bool {
        if !self.connected {
            return false;
        }
        match self.auth_mode {
            AuthMode::OAuth => {
                self.cloud_id.is_some()
                    && self.access_token_enc.is_some()
                    && self.refresh_token_enc.is_some()
            }
            AuthMode::ApiToken => {
                self.cloud_url.is_some()
                    && self.account_email.is_some()
                    && self.access_token_enc.is_some()
            }
        }
    }
}

/// Partial update applied to a credential record.
///
/// `None` fields are left untouched; the store applies the patch
/// atomically under its own lock.
#[derive(Debug, Clone, Default)]
pub struct CredentialPatch {
    pub access_token_enc: Option<String>,
    pub refresh_token_enc: Option<String>,
    pub token_expiry: Option<DateTime<Utc>>,
    pub webhook_secret_enc: Option<String>,
    pub connected: Option<bool>,
}

impl CredentialPatch {
    /// Patch that marks a tenant disconnected (refresh failed / revoked)
    pub fn disconnect() -> Self {
        Self {
            connected: Some(false),
            ..Default::default()
        }
    }

    /// Patch carrying a freshly rotated token pair
    pub fn rotated_tokens(
        access_token_enc: String,
        refresh_token_enc: String,
        token_expiry: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token_enc: Some(access_token_enc),
            refresh_token_enc: Some(refresh_token_enc),
            token_expiry: Some(token_expiry),
            ..Default::default()
        }
    }
}

/// Lightweight per-tenant webhook observability counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenantWebhookState {
    /// When the last successfully processed webhook arrived
    pub last_webhook_at: Option<DateTime<Utc>>,

    /// Consecutive processing failures since the last success
    pub failure_count: u32,
}
