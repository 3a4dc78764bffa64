//! Ticket provider adapters
//!
//! Normalizes heterogeneous tracker APIs (Jira, Zendesk) behind one
//! `TicketProvider` trait. Each adapter:
//!
//! - embeds the ownership marker on create/comment and extracts it on read
//! - sanitizes every body before it leaves the adapter
//! - normalizes tracker status vocabularies to a closed category set
//! - treats ownership mismatch exactly like "not found"

pub mod jira;
pub mod zendesk;

pub use jira::JiraProvider;
pub use zendesk::ZendeskProvider;

use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Supported trackers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Jira,
    Zendesk,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Jira => write!(f, "jira"),
            ProviderKind::Zendesk => write!(f, "zendesk"),
        }
    }
}

/// Normalized status category
///
/// Callers never branch on provider-specific status vocabularies; every
/// tracker status maps into this closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCategory {
    New,
    Indeterminate,
    Done,
    Undefined,
}

impl StatusCategory {
    /// Map a Jira status-category key ("new", "indeterminate", "done")
    pub fn from_jira_key(key: &str) -> Self {
        match key {
            "new" => StatusCategory::New,
            "indeterminate" => StatusCategory::Indeterminate,
            "done" => StatusCategory::Done,
            _ => StatusCategory::Undefined,
        }
    }

    /// Map a Zendesk lifecycle status
    pub fn from_zendesk_status(status: &str) -> Self {
        match status.to_lowercase().as_str() {
            "new" => StatusCategory::New,
            "open" | "pending" | "hold" => StatusCategory::Indeterminate,
            "solved" | "closed" => StatusCategory::Done,
            _ => StatusCategory::Undefined,
        }
    }
}

/// Normalized ticket status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketStatus {
    /// Provider-native status name, for display only
    pub name: String,
    pub category: StatusCategory,
}

/// A single ticket comment, sanitized
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketComment {
    pub id: String,
    pub body: String,
    pub author_name: Option<String>,
    /// Authored outside the portal (no ownership marker)
    pub staff: bool,
    /// Unparseable timestamps are None and treated as stale downstream
    pub created_at: Option<DateTime<Utc>>,
}

/// Full ticket projection, sanitized
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: String,
    pub summary: String,
    pub description: String,
    pub status: TicketStatus,
    pub comments: Vec<TicketComment>,
}

/// Ticket list entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketListItem {
    pub id: String,
    pub summary: String,
    pub status: TicketStatus,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Input for creating a ticket on behalf of a portal user
#[derive(Debug, Clone)]
pub struct CreateTicketInput {
    pub summary: String,
    pub description: String,
    pub owner_id: String,
    pub display_name: Option<String>,
}

/// What a provider can do beyond the core CRUD surface
#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderCapabilities {
    pub transitions: bool,
}

/// Result of a transition request. "The provider cannot reach that status"
/// is distinct from "the request failed" (which is an `Err`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied,
    Unsupported,
}

/// Uniform ticket operations over a tracker
#[async_trait]
pub trait TicketProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn capabilities(&self) -> ProviderCapabilities;

    /// Create a ticket with the ownership marker embedded in its
    /// description. Returns the provider-native ticket key.
    async fn create_ticket(&self, input: &CreateTicketInput) -> Result<String>;

    /// List the tickets owned by `owner_id`
    async fn list_tickets(&self, owner_id: &str) -> Result<Vec<TicketListItem>>;

    /// Fetch a ticket and verify the embedded marker matches `owner_id`.
    /// Returns `None` for both "not found" and "not yours" so callers
    /// cannot distinguish them.
    async fn get_ticket(&self, ticket_id: &str, owner_id: &str) -> Result<Option<Ticket>>;

    /// Fetch a ticket without ownership verification, extracting the owner
    /// from the embedded marker instead. Reserved for trusted,
    /// server-initiated paths (webhook processing); never reachable from
    /// user-facing routes.
    async fn get_ticket_unguarded(
        &self,
        ticket_id: &str,
    ) -> Result<Option<(Ticket, Option<String>)>>;

    /// Append a comment after verifying ownership, re-embedding the marker
    /// for audit continuity. Returns `Ok(false)` when ownership does not
    /// match (treated like "not found").
    async fn add_comment(
        &self,
        ticket_id: &str,
        owner_id: &str,
        body: &str,
        display_name: Option<&str>,
    ) -> Result<bool>;

    /// Move a ticket toward the target status category
    async fn transition_ticket(
        &self,
        ticket_id: &str,
        target: StatusCategory,
    ) -> Result<TransitionOutcome>;
}
