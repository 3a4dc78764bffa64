//! OAuth token refresh
//!
//! Tracker OAuth servers rotate refresh tokens on every exchange: each
//! successful refresh invalidates the token that produced it, so the caller
//! must persist the new pair immediately.

use crate::config::OAuthSettings;
use crate::retry::{with_retry, RetryConfig};
use crate::{BridgeError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(15);

/// A freshly issued token pair
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds until the access token expires
    pub expires_in: u64,
}

/// Exchanges a refresh token for a new token pair.
///
/// A trait so the provider factory can be exercised without network I/O.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair>;
}

#[derive(Debug, Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct OAuthErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Refresher speaking the tracker's OAuth token endpoint
pub struct OAuthTokenRefresher {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl OAuthTokenRefresher {
    pub fn new(settings: &OAuthSettings) -> Result<Self> {
        let client = Client::builder().timeout(EXCHANGE_TIMEOUT).build()?;
        Ok(Self {
            client,
            token_url: settings.token_url.clone(),
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret()?,
        })
    }

    async fn exchange(&self, refresh_token: &str) -> Result<TokenPair> {
        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", &self.client_id),
                ("client_secret", &self.client_secret),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let tokens: OAuthTokenResponse = response.json().await?;
                info!(expires_in = tokens.expires_in, "OAuth tokens refreshed");
                Ok(TokenPair {
                    access_token: tokens.access_token,
                    refresh_token: tokens.refresh_token,
                    expires_in: tokens.expires_in,
                })
            }
            status if status.is_client_error() => {
                // Revoked or expired grant. Terminal for this tenant; the
                // caller marks it disconnected.
                let error: OAuthErrorResponse = response.json().await.unwrap_or(OAuthErrorResponse {
                    error: None,
                    error_description: None,
                });
                let reason = error.error.unwrap_or_else(|| "invalid_grant".to_string());
                warn!(
                    reason = %reason,
                    description = error.error_description.as_deref().unwrap_or(""),
                    "OAuth refresh rejected"
                );
                Err(BridgeError::TokenRefresh(reason))
            }
            status => {
                let detail = response.text().await.unwrap_or_default();
                warn!(status = status.as_u16(), detail = %detail, "OAuth token endpoint error");
                Err(BridgeError::Upstream {
                    status: status.as_u16(),
                    detail,
                })
            }
        }
    }
}

#[async_trait]
impl TokenRefresher for OAuthTokenRefresher {
    /// Refresh with one retry for transient failures. OAuth-level rejections
    /// are not retried: the grant is gone and retrying cannot bring it back.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        with_retry(&RetryConfig::token_exchange(), "oauth_refresh", || {
            self.exchange(refresh_token)
        })
        .await
    }
}
