//! Tenant provider cache
//!
//! Process-local, TTL-based cache of constructed providers. Shared mutable
//! state across concurrent requests, guarded by a plain mutex: operations
//! are short and never hold the lock across an await point.
//!
//! At most one live entry exists per tenant; concurrent inserts race and
//! the last write wins. Entries are removed eagerly on `invalidate` (fired
//! by every credential write) and lazily on TTL expiry during `get`.

use crate::providers::TicketProvider;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

struct CachedProvider {
    provider: Arc<dyn TicketProvider>,
    expires_at: Instant,
}

/// Mutex-guarded map of tenant ID to cached provider
#[derive(Default)]
pub struct ProviderCache {
    entries: Mutex<HashMap<String, CachedProvider>>,
}

impl ProviderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached provider for a tenant, dropping it if expired
    pub fn get(&self, tenant_id: &str) -> Option<Arc<dyn TicketProvider>> {
        let mut entries = self.entries.lock().expect("provider cache poisoned");
        match entries.get(tenant_id) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.provider.clone()),
            Some(_) => {
                entries.remove(tenant_id);
                None
            }
            None => None,
        }
    }

    /// Insert a provider, replacing any existing entry for the tenant
    pub fn insert(&self, tenant_id: &str, provider: Arc<dyn TicketProvider>, ttl: Duration) {
        let mut entries = self.entries.lock().expect("provider cache poisoned");
        entries.insert(
            tenant_id.to_string(),
            CachedProvider {
                provider,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Drop a tenant's cached provider.
    ///
    /// Called synchronously on every credential write so a stale provider
    /// is never served after a configuration change.
    pub fn invalidate(&self, tenant_id: &str) {
        let mut entries = self.entries.lock().expect("provider cache poisoned");
        entries.remove(tenant_id);
    }

    /// Number of live entries (expired entries may still be counted until
    /// their next `get`)
    pub fn len(&self) -> usize {
        self.entries.lock().expect("provider cache poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
