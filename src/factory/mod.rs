//! Provider factory
//!
//! Resolves a tenant ID to a ready-to-use `TicketProvider`: loads the
//! credential record, refreshes near-expiry OAuth tokens, constructs the
//! provider, and caches it with a TTL. All credential writes go through the
//! factory so the cache is invalidated in the same call.

pub mod cache;
pub mod token;

pub use cache::ProviderCache;
pub use token::{OAuthTokenRefresher, TokenPair, TokenRefresher};

use crate::config::CacheSettings;
use crate::credentials::{
    AuthMode, Cipher, CredentialPatch, CredentialStore, TenantCredential,
};
use crate::providers::{JiraProvider, ProviderKind, TicketProvider, ZendeskProvider};
use crate::Result;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Refresh when the access token expires within this window
const EXPIRY_BUFFER_SECS: i64 = 300;

/// Anything that can turn a tenant ID into a provider.
///
/// The webhook ingestor depends on this seam rather than on the concrete
/// factory, so it can be tested with a stub.
#[async_trait]
pub trait ProviderResolver: Send + Sync {
    async fn resolve(&self, tenant_id: &str) -> Result<Option<Arc<dyn TicketProvider>>>;
}

/// Builds and caches per-tenant ticket providers
pub struct ProviderFactory {
    store: Arc<dyn CredentialStore>,
    cipher: Arc<dyn Cipher>,
    refresher: Arc<dyn TokenRefresher>,
    cache: ProviderCache,
    cache_settings: CacheSettings,
}

impl ProviderFactory {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        cipher: Arc<dyn Cipher>,
        refresher: Arc<dyn TokenRefresher>,
        cache_settings: CacheSettings,
    ) -> Self {
        Self {
            store,
            cipher,
            refresher,
            cache: ProviderCache::new(),
            cache_settings,
        }
    }

    /// Resolve a tenant to a provider, or `None` if the tenant is not
    /// connected (a typed "not configured" outcome, not an error).
    pub async fn resolve(&self, tenant_id: &str) -> Result<Option<Arc<dyn TicketProvider>>> {
        if let Some(provider) = self.cache.get(tenant_id) {
            debug!(tenant = %tenant_id, "Provider cache hit");
            return Ok(Some(provider));
        }

        let Some(credential) = self.store.get(tenant_id).await? else {
            debug!(tenant = %tenant_id, "No credential record");
            return Ok(None);
        };
        if !credential.is_usable() {
            debug!(tenant = %tenant_id, "Credential record not usable");
            return Ok(None);
        }

        let (access_token, ttl) = match credential.auth_mode {
            AuthMode::OAuth => {
                let Some(token) = self.oauth_access_token(&credential).await? else {
                    return Ok(None);
                };
                (
                    token,
                    Duration::from_secs(self.cache_settings.oauth_ttl_secs),
                )
            }
            AuthMode::ApiToken => {
                let Some(enc) = credential.access_token_enc.as_deref() else {
                    return Ok(None);
                };
                (
                    self.cipher.decrypt(enc)?,
                    Duration::from_secs(self.cache_settings.api_token_ttl_secs),
                )
            }
        };

        let Some(provider) = Self::build_provider(&credential, access_token)? else {
            return Ok(None);
        };

        self.cache.insert(tenant_id, provider.clone(), ttl);
        Ok(Some(provider))
    }

    /// Decrypt the OAuth access token, refreshing the pair first when it is
    /// inside the expiry buffer. Refresh failure disconnects the tenant.
    async fn oauth_access_token(&self, credential: &TenantCredential) -> Result<Option<String>> {
        let Some(access_enc) = credential.access_token_enc.as_deref() else {
            return Ok(None);
        };
        let Some(refresh_enc) = credential.refresh_token_enc.as_deref() else {
            return Ok(None);
        };

        let near_expiry = credential
            .token_expiry
            .map(|expiry| expiry <= Utc::now() + ChronoDuration::seconds(EXPIRY_BUFFER_SECS))
            .unwrap_or(true);

        if !near_expiry {
            return Ok(Some(self.cipher.decrypt(access_enc)?));
        }

        let refresh_token = self.cipher.decrypt(refresh_enc)?;
        match self.refresher.refresh(&refresh_token).await {
            Ok(pair) => {
                let expiry = Utc::now() + ChronoDuration::seconds(pair.expires_in as i64);
                let patch = CredentialPatch::rotated_tokens(
                    self.cipher.encrypt(&pair.access_token)?,
                    self.cipher.encrypt(&pair.refresh_token)?,
                    expiry,
                );
                self.store.update(&credential.tenant_id, patch).await?;
                info!(tenant = %credential.tenant_id, "Rotated OAuth tokens");
                Ok(Some(pair.access_token))
            }
            Err(e) => {
                // Terminal for this tenant: mark disconnected so the portal
                // can prompt reconnection.
                warn!(tenant = %credential.tenant_id, error = %e, "Token refresh failed, disconnecting tenant");
                self.store
                    .update(&credential.tenant_id, CredentialPatch::disconnect())
                    .await?;
                self.cache.invalidate(&credential.tenant_id);
                Ok(None)
            }
        }
    }

    fn build_provider(
        credential: &TenantCredential,
        access_token: String,
    ) -> Result<Option<Arc<dyn TicketProvider>>> {
        let provider: Arc<dyn TicketProvider> = match (credential.provider, credential.auth_mode) {
            (ProviderKind::Jira, AuthMode::OAuth) => {
                let Some(cloud_id) = credential.cloud_id.as_deref() else {
                    return Ok(None);
                };
                Arc::new(JiraProvider::oauth(
                    cloud_id,
                    access_token,
                    credential.project_key.clone(),
                )?)
            }
            (ProviderKind::Jira, AuthMode::ApiToken) => {
                let (Some(url), Some(email)) = (
                    credential.cloud_url.as_deref(),
                    credential.account_email.clone(),
                ) else {
                    return Ok(None);
                };
                Arc::new(JiraProvider::basic(
                    url,
                    email,
                    access_token,
                    credential.project_key.clone(),
                )?)
            }
            (ProviderKind::Zendesk, AuthMode::OAuth) => {
                let Some(url) = credential.cloud_url.as_deref() else {
                    return Ok(None);
                };
                Arc::new(ZendeskProvider::oauth(url, access_token)?)
            }
            (ProviderKind::Zendesk, AuthMode::ApiToken) => {
                let (Some(url), Some(email)) = (
                    credential.cloud_url.as_deref(),
                    credential.account_email.clone(),
                ) else {
                    return Ok(None);
                };
                Arc::new(ZendeskProvider::api_token(url, email, access_token)?)
            }
        };
        Ok(Some(provider))
    }

    /// Drop the tenant's cached provider
    pub fn invalidate(&self, tenant_id: &str) {
        self.cache.invalidate(tenant_id);
    }

    /// Write a full credential record (connect/reconnect) and invalidate
    pub async fn connect(&self, credential: TenantCredential) -> Result<()> {
        let tenant_id = credential.tenant_id.clone();
        self.store.put(credential).await?;
        self.cache.invalidate(&tenant_id);
        info!(tenant = %tenant_id, "Tenant connected");
        Ok(())
    }

    /// Destroy the credential record (disconnect) and invalidate
    pub async fn disconnect(&self, tenant_id: &str) -> Result<()> {
        self.store.delete(tenant_id).await?;
        self.cache.invalidate(tenant_id);
        info!(tenant = %tenant_id, "Tenant disconnected");
        Ok(())
    }

    /// Apply a credential patch and invalidate
    pub async fn update_credentials(&self, tenant_id: &str, patch: CredentialPatch) -> Result<()> {
        self.store.update(tenant_id, patch).await?;
        self.cache.invalidate(tenant_id);
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn cache(&self) -> &ProviderCache {
        &self.cache
    }
}

#[async_trait]
impl ProviderResolver for ProviderFactory {
    async fn resolve(&self, tenant_id: &str) -> Result<Option<Arc<dyn TicketProvider>>> {
        ProviderFactory::resolve(self, tenant_id).await
    }
}


#[cfg(test)]
mod tests {
    use super::test_stubs::StubRefresher;
    use super::*;
    use crate::credentials::{AesGcmCipher, MemoryCredentialStore};

    fn test_cipher() -> Arc<dyn Cipher> {
        Arc::new(AesGcmCipher::new("factory-test-key"))
    }

    fn oauth_credential(cipher: &dyn Cipher, expiry_offset_secs: i64) -> TenantCredential {
        TenantCredential {
            tenant_id: "acme".to_string(),
            provider: ProviderKind::Jira,
            auth_mode: AuthMode::OAuth,
            cloud_id: Some("cloud-1".to_string()),
            cloud_url: None,
            account_email: None,
            project_key: Some("SUP".to_string()),
            access_token_enc: Some(cipher.encrypt("stale-access").unwrap()),
            refresh_token_enc: Some(cipher.encrypt("stale-refresh").unwrap()),
            token_expiry: Some(Utc::now() + ChronoDuration::seconds(expiry_offset_secs)),
            webhook_secret_enc: None,
            connected: true,
        }
    }

    fn api_token_credential(cipher: &dyn Cipher, tenant: &str) -> TenantCredential {
        TenantCredential {
            tenant_id: tenant.to_string(),
            provider: ProviderKind::Jira,
            auth_mode: AuthMode::ApiToken,
            cloud_id: None,
            cloud_url: Some("https://acme.atlassian.net".to_string()),
            account_email: Some("ops@acme.test".to_string()),
            project_key: Some("SUP".to_string()),
            access_token_enc: Some(cipher.encrypt("static-token").unwrap()),
            refresh_token_enc: None,
            token_expiry: None,
            webhook_secret_enc: None,
            connected: true,
        }
    }

    fn factory_with(
        store: Arc<MemoryCredentialStore>,
        cipher: Arc<dyn Cipher>,
        refresher: Arc<StubRefresher>,
    ) -> ProviderFactory {
        ProviderFactory::new(store, cipher, refresher, CacheSettings::default())
    }

    #[tokio::test]
    async fn test_unknown_tenant_resolves_to_none() {
        let store = Arc::new(MemoryCredentialStore::new());
        let factory = factory_with(store, test_cipher(), Arc::new(StubRefresher::new()));

        assert!(factory.resolve("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_valid_token_skips_refresh() {
        let cipher = test_cipher();
        let store = Arc::new(MemoryCredentialStore::new());
        store
            .put(oauth_credential(cipher.as_ref(), 3600))
            .await
            .unwrap();

        let refresher = Arc::new(StubRefresher::new());
        let factory = factory_with(store, cipher, refresher.clone());

        let provider = factory.resolve("acme").await.unwrap();
        assert!(provider.is_some());
        assert_eq!(refresher.call_count(), 0);
        assert_eq!(factory.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_expiring_token_refreshes_once_and_persists() {
        let cipher = test_cipher();
        let store = Arc::new(MemoryCredentialStore::new());
        // Expires in 1 minute, inside the 5-minute buffer
        store
            .put(oauth_credential(cipher.as_ref(), 60))
            .await
            .unwrap();

        let refresher = Arc::new(StubRefresher::new());
        let factory = factory_with(store.clone(), cipher.clone(), refresher.clone());

        let provider = factory.resolve("acme").await.unwrap();
        assert!(provider.is_some());
        assert_eq!(refresher.call_count(), 1);

        // Rotated pair persisted encrypted, expiry pushed out
        let stored = store.get("acme").await.unwrap().unwrap();
        assert_eq!(
            cipher.decrypt(stored.access_token_enc.as_deref().unwrap()).unwrap(),
            "fresh-access"
        );
        assert_eq!(
            cipher.decrypt(stored.refresh_token_enc.as_deref().unwrap()).unwrap(),
            "fresh-refresh"
        );
        assert!(stored.token_expiry.unwrap() > Utc::now() + ChronoDuration::seconds(3000));

        // Second resolve within the TTL is a cache hit; no further refresh
        let again = factory.resolve("acme").await.unwrap();
        assert!(again.is_some());
        assert_eq!(refresher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_refresh_failure_disconnects_tenant() {
        let cipher = test_cipher();
        let store = Arc::new(MemoryCredentialStore::new());
        store
            .put(oauth_credential(cipher.as_ref(), -10))
            .await
            .unwrap();

        let refresher = Arc::new(StubRefresher::failing());
        let factory = factory_with(store.clone(), cipher, refresher.clone());

        let provider = factory.resolve("acme").await.unwrap();
        assert!(provider.is_none());
        assert_eq!(refresher.call_count(), 1);
        assert!(!store.get("acme").await.unwrap().unwrap().connected);

        // Disconnected record no longer resolves, and the refresher is not
        // hammered again
        assert!(factory.resolve("acme").await.unwrap().is_none());
        assert_eq!(refresher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_api_token_mode_never_refreshes() {
        let cipher = test_cipher();
        let store = Arc::new(MemoryCredentialStore::new());
        store
            .put(api_token_credential(cipher.as_ref(), "acme"))
            .await
            .unwrap();

        let refresher = Arc::new(StubRefresher::new());
        let factory = factory_with(store, cipher, refresher.clone());

        assert!(factory.resolve("acme").await.unwrap().is_some());
        assert_eq!(refresher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_resolves_share_single_cache_entry() {
        let cipher = test_cipher();
        let store = Arc::new(MemoryCredentialStore::new());
        store
            .put(api_token_credential(cipher.as_ref(), "acme"))
            .await
            .unwrap();

        let factory = Arc::new(factory_with(store, cipher, Arc::new(StubRefresher::new())));

        let (a, b) = tokio::join!(factory.resolve("acme"), factory.resolve("acme"));
        assert!(a.unwrap().is_some());
        assert!(b.unwrap().is_some());
        assert_eq!(factory.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_credential_writes_invalidate_cache() {
        let cipher = test_cipher();
        let store = Arc::new(MemoryCredentialStore::new());
        store
            .put(api_token_credential(cipher.as_ref(), "acme"))
            .await
            .unwrap();

        let factory = factory_with(store, cipher, Arc::new(StubRefresher::new()));

        factory.resolve("acme").await.unwrap();
        assert_eq!(factory.cache().len(), 1);

        factory
            .update_credentials("acme", CredentialPatch::disconnect())
            .await
            .unwrap();
        assert_eq!(factory.cache().len(), 0);
        assert!(factory.resolve("acme").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_connect_then_disconnect_lifecycle() {
        let cipher = test_cipher();
        let store = Arc::new(MemoryCredentialStore::new());
        let factory = factory_with(store.clone(), cipher.clone(), Arc::new(StubRefresher::new()));

        factory
            .connect(api_token_credential(cipher.as_ref(), "acme"))
            .await
            .unwrap();
        assert!(factory.resolve("acme").await.unwrap().is_some());

        factory.disconnect("acme").await.unwrap();
        assert!(store.get("acme").await.unwrap().is_none());
        assert!(factory.resolve("acme").await.unwrap().is_none());
    }
}
