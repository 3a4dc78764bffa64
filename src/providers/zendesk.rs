//! Zendesk adapter
//!
//! Speaks the Zendesk Support REST API (v2) against the tenant's subdomain
//! URL. API-token tenants authenticate as `{email}/token`; OAuth tenants use
//! a bearer token.
//!
//! Zendesk has no transition graph: status is a plain field with a fixed
//! lifecycle, so transitions map a target category onto a writable status or
//! report `Unsupported`.

use super::{
    CreateTicketInput, ProviderCapabilities, ProviderKind, StatusCategory, Ticket, TicketComment,
    TicketListItem, TicketProvider, TicketStatus, TransitionOutcome,
};
use crate::retry::{with_retry, RetryConfig};
use crate::{ownership, BridgeError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);
const GET_TIMEOUT: Duration = Duration::from_secs(10);
const WRITE_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone)]
enum ZendeskAuth {
    /// `{email}/token` Basic auth with a static API token
    ApiToken { email: String, token: String },
    /// OAuth bearer token
    Bearer(String),
}

/// Zendesk API adapter
pub struct ZendeskProvider {
    client: Client,
    base_url: String,
    auth: ZendeskAuth,
}

#[derive(Debug, Clone, Deserialize)]
struct ZendeskTicket {
    id: u64,
    subject: String,
    #[serde(default)]
    description: Option<String>,
    status: String,
    #[serde(default)]
    updated_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ZendeskTicketEnvelope {
    ticket: ZendeskTicket,
}

#[derive(Debug, Clone, Deserialize)]
struct ZendeskComment {
    id: u64,
    body: String,
    #[serde(default)]
    author_id: Option<u64>,
    #[serde(default)]
    created_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ZendeskUser {
    id: u64,
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ZendeskCommentsResponse {
    #[serde(default)]
    comments: Vec<ZendeskComment>,
    /// Sideloaded via `?include=users`
    #[serde(default)]
    users: Vec<ZendeskUser>,
}

#[derive(Debug, Clone, Deserialize)]
struct ZendeskSearchResponse {
    #[serde(default)]
    results: Vec<ZendeskTicket>,
}

impl ZendeskProvider {
    /// Adapter for a static API-token tenant
    pub fn api_token(site_url: &str, email: String, token: String) -> Result<Self> {
        Self::build(site_url, ZendeskAuth::ApiToken { email, token })
    }

    /// Adapter for an OAuth tenant
    pub fn oauth(site_url: &str, access_token: String) -> Result<Self> {
        Self::build(site_url, ZendeskAuth::Bearer(access_token))
    }

    fn build(site_url: &str, auth: ZendeskAuth) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        let base_url = format!("{}/api/v2", site_url.trim_end_matches('/'));
        Ok(Self {
            client,
            base_url,
            auth,
        })
    }

    fn apply_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            ZendeskAuth::ApiToken { email, token } => {
                request.basic_auth(format!("{}/token", email), Some(token))
            }
            ZendeskAuth::Bearer(token) => request.bearer_auth(token),
        }
    }

    async fn upstream_error(context: &str, response: reqwest::Response) -> BridgeError {
        let status = response.status().as_u16();
        let detail = response.text().await.unwrap_or_default();
        warn!(context, status, detail = %detail, "Zendesk API error");
        BridgeError::Upstream { status, detail }
    }

    async fn fetch_ticket(&self, ticket_id: &str) -> Result<Option<ZendeskTicket>> {
        let url = format!("{}/tickets/{}.json", self.base_url, ticket_id);

        debug!(id = %ticket_id, "Fetching Zendesk ticket");

        let response = self
            .apply_auth(self.client.get(&url))
            .timeout(GET_TIMEOUT)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let envelope: ZendeskTicketEnvelope = response.json().await?;
                Ok(Some(envelope.ticket))
            }
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(Self::upstream_error("get_ticket", response).await),
        }
    }

    async fn search(&self, query: &str) -> Result<Vec<ZendeskTicket>> {
        let url = format!("{}/search.json", self.base_url);

        debug!(query = %query, "Searching Zendesk tickets");

        let response = self
            .apply_auth(self.client.get(&url))
            .query(&[("query", query)])
            .timeout(SEARCH_TIMEOUT)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let search: ZendeskSearchResponse = response.json().await?;
                Ok(search.results)
            }
            _ => Err(Self::upstream_error("search", response).await),
        }
    }

    async fn fetch_comments(&self, ticket_id: &str) -> Result<ZendeskCommentsResponse> {
        let url = format!("{}/tickets/{}/comments.json", self.base_url, ticket_id);

        let response = self
            .apply_auth(self.client.get(&url))
            .query(&[("include", "users")])
            .timeout(GET_TIMEOUT)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            _ => Err(Self::upstream_error("get_comments", response).await),
        }
    }

    fn status_of(status: &str) -> TicketStatus {
        TicketStatus {
            name: status.to_string(),
            category: StatusCategory::from_zendesk_status(status),
        }
    }

    /// Build the sanitized projection. The first Zendesk comment is the
    /// ticket description and is not repeated in the comment list.
    fn project_ticket(
        ticket: &ZendeskTicket,
        comments: &ZendeskCommentsResponse,
        owner_id: Option<&str>,
    ) -> Ticket {
        let authors: HashMap<u64, &str> = comments
            .users
            .iter()
            .map(|u| (u.id, u.name.as_str()))
            .collect();

        let projected = comments
            .comments
            .iter()
            .skip(1)
            .map(|c| {
                let staff = match owner_id {
                    Some(owner) => !ownership::is_owned_by(&c.body, owner),
                    None => true,
                };
                TicketComment {
                    id: c.id.to_string(),
                    body: ownership::sanitize(&c.body),
                    author_name: c
                        .author_id
                        .and_then(|id| authors.get(&id).map(|name| name.to_string())),
                    staff,
                    created_at: c
                        .created_at
                        .as_deref()
                        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                        .map(|dt| dt.with_timezone(&Utc)),
                }
            })
            .collect();

        let description = ticket.description.clone().unwrap_or_default();
        Ticket {
            id: ticket.id.to_string(),
            summary: ticket.subject.clone(),
            description: ownership::sanitize(&description),
            status: Self::status_of(&ticket.status),
            comments: projected,
        }
    }

    /// The description holding the ownership marker. Falls back to the first
    /// comment when the search projection omitted the description field.
    fn ticket_owner(ticket: &ZendeskTicket) -> Option<String> {
        ticket.description.as_deref().and_then(ownership::extract)
    }

    fn writable_status(target: StatusCategory) -> Option<&'static str> {
        match target {
            StatusCategory::Done => Some("solved"),
            StatusCategory::Indeterminate => Some("open"),
            // Zendesk tickets cannot return to "new", and "undefined" names
            // nothing writable
            StatusCategory::New | StatusCategory::Undefined => None,
        }
    }
}

#[async_trait]
impl TicketProvider for ZendeskProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Zendesk
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities { transitions: true }
    }

    async fn create_ticket(&self, input: &CreateTicketInput) -> Result<String> {
        let url = format!("{}/tickets.json", self.base_url);
        let body = serde_json::json!({
            "ticket": {
                "subject": input.summary,
                "comment": {
                    "body": ownership::embed(
                        &input.description,
                        &input.owner_id,
                        input.display_name.as_deref(),
                    ),
                },
            }
        });

        info!("Creating Zendesk ticket");

        let response = self
            .apply_auth(self.client.post(&url))
            .json(&body)
            .timeout(WRITE_TIMEOUT)
            .send()
            .await?;

        match response.status() {
            StatusCode::CREATED | StatusCode::OK => {
                let envelope: ZendeskTicketEnvelope = response.json().await?;
                info!(id = envelope.ticket.id, "Created Zendesk ticket");
                Ok(envelope.ticket.id.to_string())
            }
            _ => Err(Self::upstream_error("create_ticket", response).await),
        }
    }

    async fn list_tickets(&self, owner_id: &str) -> Result<Vec<TicketListItem>> {
        let safe_owner: String = owner_id.chars().filter(|c| c.is_ascii_digit()).collect();
        if safe_owner.is_empty() {
            return Ok(Vec::new());
        }

        let query = format!("type:ticket \"Owner ID: {}\"", safe_owner);

        let results = with_retry(&RetryConfig::read_once(), "zendesk_list", || {
            self.search(&query)
        })
        .await?;

        Ok(results
            .into_iter()
            .filter(|ticket| {
                ticket
                    .description
                    .as_deref()
                    .map(|d| ownership::is_owned_by(d, owner_id))
                    .unwrap_or(false)
            })
            .map(|ticket| TicketListItem {
                id: ticket.id.to_string(),
                summary: ticket.subject.clone(),
                status: Self::status_of(&ticket.status),
                updated_at: ticket
                    .updated_at
                    .as_deref()
                    .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                    .map(|dt| dt.with_timezone(&Utc)),
            })
            .collect())
    }

    async fn get_ticket(&self, ticket_id: &str, owner_id: &str) -> Result<Option<Ticket>> {
        let ticket = with_retry(&RetryConfig::read_once(), "zendesk_get", || {
            self.fetch_ticket(ticket_id)
        })
        .await?;

        let Some(ticket) = ticket else {
            return Ok(None);
        };

        if Self::ticket_owner(&ticket).as_deref() != Some(owner_id) {
            debug!(id = %ticket_id, "Ownership mismatch on guarded fetch");
            return Ok(None);
        }

        let comments = self.fetch_comments(ticket_id).await?;
        Ok(Some(Self::project_ticket(
            &ticket,
            &comments,
            Some(owner_id),
        )))
    }

    async fn get_ticket_unguarded(
        &self,
        ticket_id: &str,
    ) -> Result<Option<(Ticket, Option<String>)>> {
        let ticket = with_retry(&RetryConfig::read_once(), "zendesk_get_unguarded", || {
            self.fetch_ticket(ticket_id)
        })
        .await?;

        let Some(ticket) = ticket else {
            return Ok(None);
        };

        let owner_id = Self::ticket_owner(&ticket);
        let comments = self.fetch_comments(ticket_id).await?;
        let projected = Self::project_ticket(&ticket, &comments, owner_id.as_deref());
        Ok(Some((projected, owner_id)))
    }

    async fn add_comment(
        &self,
        ticket_id: &str,
        owner_id: &str,
        body: &str,
        display_name: Option<&str>,
    ) -> Result<bool> {
        let ticket = self.fetch_ticket(ticket_id).await?;
        let Some(ticket) = ticket else {
            return Ok(false);
        };

        if Self::ticket_owner(&ticket).as_deref() != Some(owner_id) {
            debug!(id = %ticket_id, "Ownership mismatch on add_comment");
            return Ok(false);
        }

        let url = format!("{}/tickets/{}.json", self.base_url, ticket_id);
        let payload = serde_json::json!({
            "ticket": {
                "comment": {
                    "body": ownership::embed(body, owner_id, display_name),
                    "public": true,
                },
            }
        });

        info!(id = %ticket_id, "Adding comment to Zendesk ticket");

        let response = self
            .apply_auth(self.client.put(&url))
            .json(&payload)
            .timeout(WRITE_TIMEOUT)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            _ => Err(Self::upstream_error("add_comment", response).await),
        }
    }

    async fn transition_ticket(
        &self,
        ticket_id: &str,
        target: StatusCategory,
    ) -> Result<TransitionOutcome> {
        let Some(status) = Self::writable_status(target) else {
            debug!(id = %ticket_id, ?target, "Zendesk cannot write target status");
            return Ok(TransitionOutcome::Unsupported);
        };

        let url = format!("{}/tickets/{}.json", self.base_url, ticket_id);
        let payload = serde_json::json!({ "ticket": { "status": status } });

        info!(id = %ticket_id, status = %status, "Updating Zendesk ticket status");

        let response = self
            .apply_auth(self.client.put(&url))
            .json(&payload)
            .timeout(WRITE_TIMEOUT)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(TransitionOutcome::Applied),
            _ => Err(Self::upstream_error("transition", response).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: &str = "123456789012345678";

    #[test]
    fn test_base_url() {
        let provider = ZendeskProvider::api_token(
            "https://acme.zendesk.com/",
            "ops@acme.test".to_string(),
            "tok".to_string(),
        )
        .expect("adapter");
        assert_eq!(provider.base_url, "https://acme.zendesk.com/api/v2");
        assert!(provider.capabilities().transitions);
    }

    #[test]
    fn test_writable_status_mapping() {
        assert_eq!(
            ZendeskProvider::writable_status(StatusCategory::Done),
            Some("solved")
        );
        assert_eq!(
            ZendeskProvider::writable_status(StatusCategory::Indeterminate),
            Some("open")
        );
        assert_eq!(ZendeskProvider::writable_status(StatusCategory::New), None);
        assert_eq!(
            ZendeskProvider::writable_status(StatusCategory::Undefined),
            None
        );
    }

    #[test]
    fn test_project_ticket_skips_description_comment() {
        let ticket = ZendeskTicket {
            id: 99,
            subject: "Broken login".to_string(),
            description: Some(crate::ownership::embed("cannot log in", OWNER, None)),
            status: "open".to_string(),
            updated_at: None,
        };
        let comments = ZendeskCommentsResponse {
            comments: vec![
                ZendeskComment {
                    id: 1,
                    body: crate::ownership::embed("cannot log in", OWNER, None),
                    author_id: Some(7),
                    created_at: None,
                },
                ZendeskComment {
                    id: 2,
                    body: "We are looking into it".to_string(),
                    author_id: Some(8),
                    created_at: Some("2024-01-15T10:30:00Z".to_string()),
                },
            ],
            users: vec![ZendeskUser {
                id: 8,
                name: "Agent Smith".to_string(),
            }],
        };

        let projected = ZendeskProvider::project_ticket(&ticket, &comments, Some(OWNER));

        assert_eq!(projected.id, "99");
        assert_eq!(projected.description, "cannot log in");
        assert_eq!(projected.status.category, StatusCategory::Indeterminate);

        // Description comment dropped; only the agent reply remains
        assert_eq!(projected.comments.len(), 1);
        let reply = &projected.comments[0];
        assert!(reply.staff);
        assert_eq!(reply.author_name.as_deref(), Some("Agent Smith"));
        assert!(reply.created_at.is_some());
    }

    #[test]
    fn test_ticket_owner_extraction() {
        let ticket = ZendeskTicket {
            id: 1,
            subject: "s".to_string(),
            description: Some(crate::ownership::embed("body", OWNER, None)),
            status: "new".to_string(),
            updated_at: None,
        };
        assert_eq!(ZendeskProvider::ticket_owner(&ticket).as_deref(), Some(OWNER));
    }
}
