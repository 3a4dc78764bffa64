//! Inbound webhook payloads
//!
//! The upstream automation tooling sends two shapes: a lightweight
//! `{"issueKey": "...", "event": "..."}` payload and the classic
//! `{"webhookEvent": "...", "issue": {"key": "..."}}` payload. Shape
//! variance is never an error; anything unrecognized is acknowledged and
//! skipped.

use serde::Deserialize;

/// Event kinds this pipeline acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookEventKind {
    CommentCreated,
    IssueTransitioned,
    IssueUpdated,
    Unhandled,
}

impl WebhookEventKind {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "comment_created" => WebhookEventKind::CommentCreated,
            "issue_transitioned" => WebhookEventKind::IssueTransitioned,
            "jira:issue_updated" => WebhookEventKind::IssueUpdated,
            _ => WebhookEventKind::Unhandled,
        }
    }
}

/// Tolerantly parsed webhook body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    /// `event` (lightweight) or `webhookEvent` (classic)
    #[serde(default, alias = "webhookEvent")]
    pub event: Option<String>,

    /// `issueKey` in the lightweight shape
    #[serde(default, rename = "issueKey")]
    pub issue_key: Option<String>,

    /// `issue.key` in the classic shape
    #[serde(default)]
    pub issue: Option<IssueRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssueRef {
    #[serde(default)]
    pub key: Option<String>,
}

impl WebhookPayload {
    /// The issue key, from either payload shape
    pub fn issue_key(&self) -> Option<&str> {
        self.issue_key
            .as_deref()
            .or_else(|| self.issue.as_ref().and_then(|i| i.key.as_deref()))
    }

    pub fn event_kind(&self) -> WebhookEventKind {
        self.event
            .as_deref()
            .map(WebhookEventKind::parse)
            .unwrap_or(WebhookEventKind::Unhandled)
    }
}
