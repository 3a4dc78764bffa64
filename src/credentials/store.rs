//! Credential store boundary
//!
//! The portal's relational persistence layer is consumed as a
//! key-value-ish store keyed by tenant ID. `MemoryCredentialStore` is the
//! in-process reference implementation used by tests and single-node
//! deployments.

use super::{CredentialPatch, TenantCredential, TenantWebhookState};
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Per-tenant credential persistence
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fetch a tenant's credential record
    async fn get(&self, tenant_id: &str) -> Result<Option<TenantCredential>>;

    /// Insert or replace a tenant's credential record (connect/reconnect)
    async fn put(&self, credential: TenantCredential) -> Result<()>;

    /// Apply a partial update to an existing record.
    /// Patching a missing tenant is a storage error.
    async fn update(&self, tenant_id: &str, patch: CredentialPatch) -> Result<()>;

    /// Destroy a tenant's credential record (disconnect)
    async fn delete(&self, tenant_id: &str) -> Result<()>;

    /// Read the webhook observability counters for a tenant
    async fn webhook_state(&self, tenant_id: &str) -> Result<TenantWebhookState>;

    /// Stamp `last_webhook_at` and reset the failure counter
    async fn record_webhook_success(&self, tenant_id: &str) -> Result<()>;

    /// Increment the failure counter
    async fn record_webhook_failure(&self, tenant_id: &str) -> Result<()>;
}

/// In-memory credential store
#[derive(Default)]
pub struct MemoryCredentialStore {
    credentials: RwLock<HashMap<String, TenantCredential>>,
    webhook_states: RwLock<HashMap<String, TenantWebhookState>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self, tenant_id: &str) -> Result<Option<TenantCredential>> {
        Ok(self.credentials.read().await.get(tenant_id).cloned())
    }

    async fn put(&self, credential: TenantCredential) -> Result<()> {
        self.credentials
            .write()
            .await
            .insert(credential.tenant_id.clone(), credential);
        Ok(())
    }

    async fn update(&self, tenant_id: &str, patch: CredentialPatch) -> Result<()> {
        let mut credentials = self.credentials.write().await;
        let record = credentials.get_mut(tenant_id).ok_or_else(|| {
            crate::BridgeError::Storage(format!("No credential record for tenant: {}", tenant_id))
        })?;

        if let Some(token) = patch.access_token_enc {
            record.access_token_enc = Some(token);
        }
        if let Some(token) = patch.refresh_token_enc {
            record.refresh_token_enc = Some(token);
        }
        if let Some(expiry) = patch.token_expiry {
            record.token_expiry = Some(expiry);
        }
        if let Some(secret) = patch.webhook_secret_enc {
            record.webhook_secret_enc = Some(secret);
        }
        if let Some(connected) = patch.connected {
            record.connected = connected;
        }
        Ok(())
    }

    async fn delete(&self, tenant_id: &str) -> Result<()> {
        self.credentials.write().await.remove(tenant_id);
        self.webhook_states.write().await.remove(tenant_id);
        Ok(())
    }

    async fn webhook_state(&self, tenant_id: &str) -> Result<TenantWebhookState> {
        Ok(self
            .webhook_states
            .read()
            .await
            .get(tenant_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn record_webhook_success(&self, tenant_id: &str) -> Result<()> {
        let mut states = self.webhook_states.write().await;
        let state = states.entry(tenant_id.to_string()).or_default();
        state.last_webhook_at = Some(Utc::now());
        state.failure_count = 0;
        Ok(())
    }

    async fn record_webhook_failure(&self, tenant_id: &str) -> Result<()> {
        let mut states = self.webhook_states.write().await;
        let state = states.entry(tenant_id.to_string()).or_default();
        state.failure_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::AuthMode;
    use crate::providers::ProviderKind;

    fn test_credential(tenant: &str) -> TenantCredential {
        TenantCredential {
            tenant_id: tenant.to_string(),
            provider: ProviderKind::Jira,
            auth_mode: AuthMode::ApiToken,
            cloud_id: None,
            cloud_url: Some("https://acme.atlassian.net".to_string()),
            account_email: Some("ops@acme.test".to_string()),
            project_key: Some("SUP".to_string()),
            access_token_enc: Some("enc".to_string()),
            refresh_token_enc: None,
            token_expiry: None,
            webhook_secret_enc: None,
            connected: true,
        }
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryCredentialStore::new();
        store.put(test_credential("acme")).await.unwrap();

        let fetched = store.get("acme").await.unwrap().unwrap();
        assert_eq!(fetched.tenant_id, "acme");

        store.delete("acme").await.unwrap();
        assert!(store.get("acme").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_patch_updates_only_set_fields() {
        let store = MemoryCredentialStore::new();
        store.put(test_credential("acme")).await.unwrap();

        store
            .update("acme", CredentialPatch::disconnect())
            .await
            .unwrap();

        let fetched = store.get("acme").await.unwrap().unwrap();
        assert!(!fetched.connected);
        // Untouched fields survive the patch
        assert_eq!(fetched.access_token_enc.as_deref(), Some("enc"));
    }

    #[tokio::test]
    async fn test_patch_missing_tenant_errors() {
        let store = MemoryCredentialStore::new();
        let result = store.update("ghost", CredentialPatch::disconnect()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_webhook_counters() {
        let store = MemoryCredentialStore::new();

        store.record_webhook_failure("acme").await.unwrap();
        store.record_webhook_failure("acme").await.unwrap();
        assert_eq!(store.webhook_state("acme").await.unwrap().failure_count, 2);

        store.record_webhook_success("acme").await.unwrap();
        let state = store.webhook_state("acme").await.unwrap();
        assert_eq!(state.failure_count, 0);
        assert!(state.last_webhook_at.is_some());
    }
}
