//! Outbound notification dispatch
//!
//! Sends direct messages to ticket owners when staff activity arrives via
//! webhook. The messaging client is an external collaborator consumed
//! behind `DirectMessenger`; delivery is idempotent per
//! `(owner_id, ticket_id)` (the client updates an existing message rather
//! than posting a new one).
//!
//! Dispatch is fire-and-forget relative to the webhook response: failures
//! are logged, never surfaced to the original caller.

use crate::providers::{Ticket, TicketComment};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Direct-message client boundary
#[async_trait]
pub trait DirectMessenger: Send + Sync {
    /// Send a message to `owner_id` about `ticket_id`, or update the one
    /// already sent for that pair.
    async fn send_or_update(&self, owner_id: &str, ticket_id: &str, content: &str) -> Result<()>;
}

/// Messenger that drops everything on the floor (logged at debug).
/// Used when no messaging client is wired up.
pub struct NullMessenger;

#[async_trait]
impl DirectMessenger for NullMessenger {
    async fn send_or_update(&self, owner_id: &str, ticket_id: &str, _content: &str) -> Result<()> {
        debug!(owner = %owner_id, ticket = %ticket_id, "No messenger configured, dropping notification");
        Ok(())
    }
}

/// Formats and dispatches owner notifications
pub struct NotificationDispatcher {
    messenger: Arc<dyn DirectMessenger>,
}

impl NotificationDispatcher {
    pub fn new(messenger: Arc<dyn DirectMessenger>) -> Self {
        Self { messenger }
    }

    /// Notification text for a fresh staff comment
    fn comment_message(ticket: &Ticket, comment: &TicketComment) -> String {
        let author = comment.author_name.as_deref().unwrap_or("Support");
        format!(
            "Ticket {} ({})\n{} replied:\n{}",
            ticket.id, ticket.status.name, author, comment.body
        )
    }

    /// Notification text for a status change
    fn status_message(ticket: &Ticket) -> String {
        format!("Ticket {} is now: {}", ticket.id, ticket.status.name)
    }

    /// Deliver a comment notification, awaiting the messenger
    pub async fn deliver_comment(
        &self,
        owner_id: &str,
        ticket: &Ticket,
        comment: &TicketComment,
    ) -> Result<()> {
        let content = Self::comment_message(ticket, comment);
        self.messenger
            .send_or_update(owner_id, &ticket.id, &content)
            .await
    }

    /// Deliver a status-refresh notification, awaiting the messenger
    pub async fn deliver_status(&self, owner_id: &str, ticket: &Ticket) -> Result<()> {
        let content = Self::status_message(ticket);
        self.messenger
            .send_or_update(owner_id, &ticket.id, &content)
            .await
    }

    /// Fire-and-forget comment notification
    pub fn spawn_comment(self: &Arc<Self>, owner_id: String, ticket: Ticket, comment: TicketComment) {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            if let Err(e) = dispatcher.deliver_comment(&owner_id, &ticket, &comment).await {
                warn!(owner = %owner_id, ticket = %ticket.id, error = %e, "Comment notification failed");
            }
        });
    }

    /// Fire-and-forget status notification
    pub fn spawn_status(self: &Arc<Self>, owner_id: String, ticket: Ticket) {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            if let Err(e) = dispatcher.deliver_status(&owner_id, &ticket).await {
                warn!(owner = %owner_id, ticket = %ticket.id, error = %e, "Status notification failed");
            }
        });
    }
}
