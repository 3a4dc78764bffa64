//! Webhook event processing
//!
//! Separated from the HTTP layer so it can be exercised without a server.
//! The pipeline fetches authoritative ticket state (the payload is only
//! trusted for the issue key and event kind), classifies the event, and
//! dispatches owner notifications.

use super::events::{WebhookEventKind, WebhookPayload};
use crate::credentials::CredentialStore;
use crate::factory::ProviderResolver;
use crate::notify::NotificationDispatcher;
use crate::providers::TicketComment;
use crate::{BridgeError, Result};
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A staff comment older than this is treated as historical noise: Jira
/// automation re-fires on unrelated triggers and must not re-notify.
const FRESHNESS_WINDOW_SECS: i64 = 120;

/// What processing decided to do with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A fresh staff comment was dispatched to the owner
    CommentNotified,
    /// The notification surface was refreshed with current status
    StatusRefreshed,
    /// Acknowledged without action
    Skipped(&'static str),
}

impl IngestOutcome {
    pub fn skipped(&self) -> bool {
        matches!(self, IngestOutcome::Skipped(_))
    }
}

/// Drives webhook processing for one deployment
pub struct WebhookIngestor {
    resolver: Arc<dyn ProviderResolver>,
    store: Arc<dyn CredentialStore>,
    dispatcher: Arc<NotificationDispatcher>,
}

impl WebhookIngestor {
    pub fn new(
        resolver: Arc<dyn ProviderResolver>,
        store: Arc<dyn CredentialStore>,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            resolver,
            store,
            dispatcher,
        }
    }

    /// Process an authenticated payload and update the tenant's webhook
    /// counters: success stamps `last_webhook_at` and resets the failure
    /// count, a processing error increments it.
    pub async fn handle(&self, tenant_id: &str, payload: &WebhookPayload) -> Result<IngestOutcome> {
        match self.process(tenant_id, payload).await {
            Ok(outcome) => {
                if let Err(e) = self.store.record_webhook_success(tenant_id).await {
                    warn!(tenant = %tenant_id, error = %e, "Failed to record webhook success");
                }
                Ok(outcome)
            }
            Err(e) => {
                if let Err(record_err) = self.store.record_webhook_failure(tenant_id).await {
                    warn!(tenant = %tenant_id, error = %record_err, "Failed to record webhook failure");
                }
                Err(e)
            }
        }
    }

    async fn process(&self, tenant_id: &str, payload: &WebhookPayload) -> Result<IngestOutcome> {
        let Some(issue_key) = payload.issue_key() else {
            debug!(tenant = %tenant_id, "Webhook payload carries no issue key");
            return Ok(IngestOutcome::Skipped("no issue key"));
        };

        let kind = payload.event_kind();
        if kind == WebhookEventKind::Unhandled {
            debug!(tenant = %tenant_id, event = ?payload.event, "Unhandled webhook event type");
            return Ok(IngestOutcome::Skipped("unhandled event type"));
        }

        let Some(provider) = self.resolver.resolve(tenant_id).await? else {
            return Err(BridgeError::NotConfigured(tenant_id.to_string()));
        };

        // The payload is untrusted beyond the key; fetch authoritative state
        let Some((ticket, owner_id)) = provider.get_ticket_unguarded(issue_key).await? else {
            debug!(tenant = %tenant_id, key = %issue_key, "Ticket not found upstream");
            return Ok(IngestOutcome::Skipped("ticket not found"));
        };

        let Some(owner_id) = owner_id else {
            debug!(tenant = %tenant_id, key = %issue_key, "Ticket has no ownership marker");
            return Ok(IngestOutcome::Skipped("unowned ticket"));
        };

        match kind {
            WebhookEventKind::CommentCreated | WebhookEventKind::IssueUpdated => {
                let Some(comment) = latest_fresh_staff_comment(&ticket.comments) else {
                    debug!(tenant = %tenant_id, key = %issue_key, "No fresh staff comment");
                    return Ok(IngestOutcome::Skipped("no fresh staff comment"));
                };

                info!(
                    tenant = %tenant_id,
                    key = %issue_key,
                    comment_id = %comment.id,
                    "Dispatching staff comment notification"
                );
                let comment = comment.clone();
                self.dispatcher.spawn_comment(owner_id, ticket, comment);
                Ok(IngestOutcome::CommentNotified)
            }
            WebhookEventKind::IssueTransitioned => {
                info!(
                    tenant = %tenant_id,
                    key = %issue_key,
                    status = %ticket.status.name,
                    "Refreshing notification surface after transition"
                );
                self.dispatcher.spawn_status(owner_id, ticket);
                Ok(IngestOutcome::StatusRefreshed)
            }
            WebhookEventKind::Unhandled => Ok(IngestOutcome::Skipped("unhandled event type")),
        }
    }
}

/// Most recent staff comment inside the freshness window.
///
/// Comments with no parseable timestamp are treated as stale.
fn latest_fresh_staff_comment(comments: &[TicketComment]) -> Option<&TicketComment> {
    let newest_staff = comments
        .iter()
        .filter(|c| c.staff)
        .max_by_key(|c| c.created_at)?;

    let created_at = newest_staff.created_at?;
    let age = Utc::now().signed_duration_since(created_at);
    if age <= ChronoDuration::seconds(FRESHNESS_WINDOW_SECS) {
        Some(newest_staff)
    } else {
        None
    }
}
