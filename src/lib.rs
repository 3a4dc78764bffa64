//! TicketBridge - Multi-Tenant Ticketing Provider Bridge
//!
//! TicketBridge is the integration layer between a multi-tenant support
//! portal and external issue trackers. It resolves and refreshes per-tenant
//! credentials, normalizes Jira and Zendesk behind one provider trait,
//! carries ticket ownership as embedded body markers, and turns inbound
//! tracker webhooks into direct-message notifications for ticket owners.
//!
//! # Architecture
//!
//! - **credentials**: Tenant credential records, store and cipher boundaries
//! - **ownership**: Marker codec (embed / extract / sanitize)
//! - **providers**: `TicketProvider` trait with Jira and Zendesk adapters
//! - **factory**: Per-tenant provider resolution, token refresh, TTL cache
//! - **webhook**: Inbound webhook server and ingest pipeline
//! - **notify**: Outbound notification dispatch
//! - **config**: YAML settings with env-indirected secrets

// Core modules
pub mod config;
pub mod credentials;
pub mod error;
pub mod logging;
pub mod retry;

// Components
pub mod factory;
pub mod notify;
pub mod ownership;
pub mod providers;
pub mod webhook;

// Re-exports
pub use error::{BridgeError, Result};
