//! Jira adapter
//!
//! Speaks the Jira Cloud REST API (v2, plain-text bodies). OAuth tenants go
//! through the Atlassian API gateway (`api.atlassian.com/ex/jira/{cloudId}`);
//! API-token tenants hit their site URL directly with Basic auth.

use super::{
    CreateTicketInput, ProviderCapabilities, ProviderKind, StatusCategory, Ticket, TicketComment,
    TicketListItem, TicketProvider, TicketStatus, TransitionOutcome,
};
use crate::retry::{with_retry, RetryConfig};
use crate::{ownership, BridgeError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Per-request timeout for search/query operations (large result sets)
const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);
/// Per-request timeout for single issue fetches
const GET_TIMEOUT: Duration = Duration::from_secs(10);
/// Per-request timeout for create/update operations
const WRITE_TIMEOUT: Duration = Duration::from_secs(15);

const LIST_MAX_RESULTS: u32 = 50;

/// How this adapter authenticates against Jira
#[derive(Clone)]
enum JiraAuth {
    /// OAuth bearer token (tenant connected via 3LO)
    Bearer(String),
    /// Account email + static API token
    Basic { email: String, token: String },
}

/// Jira API adapter
pub struct JiraProvider {
    client: Client,
    base_url: String,
    auth: JiraAuth,
    project_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct JiraIssue {
    key: String,
    fields: JiraFields,
}

#[derive(Debug, Clone, Deserialize)]
struct JiraFields {
    summary: String,
    #[serde(default)]
    description: Option<String>,
    status: JiraStatus,
    #[serde(default)]
    comment: Option<JiraCommentPage>,
    #[serde(default)]
    updated: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct JiraStatus {
    name: String,
    #[serde(rename = "statusCategory", default)]
    status_category: Option<JiraStatusCategory>,
}

#[derive(Debug, Clone, Deserialize)]
struct JiraStatusCategory {
    key: String,
}

#[derive(Debug, Clone, Deserialize)]
struct JiraCommentPage {
    #[serde(default)]
    comments: Vec<JiraComment>,
}

#[derive(Debug, Clone, Deserialize)]
struct JiraComment {
    id: String,
    body: String,
    #[serde(default)]
    author: Option<JiraUser>,
    #[serde(default)]
    created: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct JiraUser {
    #[serde(rename = "displayName")]
    display_name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct JiraSearchResponse {
    #[serde(default)]
    issues: Vec<JiraIssue>,
}

#[derive(Debug, Clone, Deserialize)]
struct JiraTransition {
    id: String,
    to: JiraStatus,
}

#[derive(Debug, Clone, Deserialize)]
struct JiraTransitionsResponse {
    #[serde(default)]
    transitions: Vec<JiraTransition>,
}

#[derive(Debug, Clone, Deserialize)]
struct JiraCreateResponse {
    key: String,
}

#[derive(Debug, Serialize)]
struct JiraCommentCreate {
    body: String,
}

#[derive(Debug, Serialize)]
struct JiraTransitionRequest {
    transition: JiraTransitionId,
}

#[derive(Debug, Serialize)]
struct JiraTransitionId {
    id: String,
}

const ISSUE_FIELDS: &str = "summary,description,status,comment,updated";
const LIST_FIELDS: &str = "summary,description,status,updated";

impl JiraProvider {
    /// Adapter for an OAuth tenant, routed through the Atlassian gateway
    pub fn oauth(
        cloud_id: &str,
        access_token: String,
        project_key: Option<String>,
    ) -> Result<Self> {
        let base_url = format!("https://api.atlassian.com/ex/jira/{}/rest/api/2", cloud_id);
        Self::build(base_url, JiraAuth::Bearer(access_token), project_key)
    }

    /// Adapter for a static API-token tenant, hitting the site directly
    pub fn basic(
        site_url: &str,
        email: String,
        api_token: String,
        project_key: Option<String>,
    ) -> Result<Self> {
        let base_url = format!("{}/rest/api/2", site_url.trim_end_matches('/'));
        Self::build(
            base_url,
            JiraAuth::Basic {
                email,
                token: api_token,
            },
            project_key,
        )
    }

    fn build(base_url: String, auth: JiraAuth, project_key: Option<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            base_url,
            auth,
            project_key,
        })
    }

    fn apply_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            JiraAuth::Bearer(token) => request.bearer_auth(token),
            JiraAuth::Basic { email, token } => request.basic_auth(email, Some(token)),
        }
    }

    /// Keep only digits; owner IDs are numeric and anything else would be
    /// JQL injection.
    fn sanitize_owner_id(owner_id: &str) -> String {
        owner_id.chars().filter(|c| c.is_ascii_digit()).collect()
    }

    async fn upstream_error(context: &str, response: reqwest::Response) -> BridgeError {
        let status = response.status().as_u16();
        let detail = response.text().await.unwrap_or_default();
        warn!(context, status, detail = %detail, "Jira API error");
        BridgeError::Upstream { status, detail }
    }

    async fn fetch_issue(&self, key: &str) -> Result<Option<JiraIssue>> {
        let url = format!("{}/issue/{}", self.base_url, key);

        debug!(key = %key, "Fetching Jira issue");

        let request = self
            .apply_auth(self.client.get(&url))
            .query(&[("fields", ISSUE_FIELDS)]);
        let response = request.timeout(GET_TIMEOUT).send().await?;

        match response.status() {
            StatusCode::OK => Ok(Some(response.json().await?)),
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(Self::upstream_error("get_issue", response).await),
        }
    }

    async fn search(&self, jql: &str, fields: &str, max_results: u32) -> Result<Vec<JiraIssue>> {
        let url = format!("{}/search", self.base_url);

        debug!(jql = %jql, "Searching Jira issues");

        let request = self.apply_auth(self.client.get(&url)).query(&[
            ("jql", jql),
            ("fields", fields),
            ("maxResults", &max_results.to_string()),
        ]);
        let response = request.timeout(SEARCH_TIMEOUT).send().await?;

        match response.status() {
            StatusCode::OK => {
                let result: JiraSearchResponse = response.json().await?;
                Ok(result.issues)
            }
            _ => Err(Self::upstream_error("search", response).await),
        }
    }

    fn status_of(status: &JiraStatus) -> TicketStatus {
        let category = status
            .status_category
            .as_ref()
            .map(|cat| StatusCategory::from_jira_key(&cat.key))
            .unwrap_or(StatusCategory::Undefined);
        TicketStatus {
            name: status.name.clone(),
            category,
        }
    }

    /// Build the sanitized projection. The owner marker never survives this.
    fn project_ticket(issue: &JiraIssue, owner_id: Option<&str>) -> Ticket {
        let description = issue.fields.description.clone().unwrap_or_default();
        let comments = issue
            .fields
            .comment
            .as_ref()
            .map(|page| {
                page.comments
                    .iter()
                    .map(|c| {
                        let staff = match owner_id {
                            Some(owner) => !ownership::is_owned_by(&c.body, owner),
                            None => true,
                        };
                        TicketComment {
                            id: c.id.clone(),
                            body: ownership::sanitize(&c.body),
                            author_name: c.author.as_ref().map(|a| a.display_name.clone()),
                            staff,
                            created_at: c.created.as_deref().and_then(parse_jira_time),
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ticket {
            id: issue.key.clone(),
            summary: issue.fields.summary.clone(),
            description: ownership::sanitize(&description),
            status: Self::status_of(&issue.fields.status),
            comments,
        }
    }
}

/// Jira timestamps look like `2024-01-15T10:30:00.000+0000`
fn parse_jira_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.3f%z")
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

#[async_trait]
impl TicketProvider for JiraProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Jira
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities { transitions: true }
    }

    async fn create_ticket(&self, input: &CreateTicketInput) -> Result<String> {
        let project_key = self.project_key.as_deref().ok_or_else(|| {
            BridgeError::NotConfigured("Jira project key not configured".to_string())
        })?;

        let url = format!("{}/issue", self.base_url);
        let description = ownership::embed(
            &input.description,
            &input.owner_id,
            input.display_name.as_deref(),
        );
        let body = serde_json::json!({
            "fields": {
                "project": { "key": project_key },
                "summary": input.summary,
                "description": description,
                "issuetype": { "name": "Task" },
            }
        });

        info!(project = %project_key, "Creating Jira issue");

        let request = self.apply_auth(self.client.post(&url)).json(&body);
        let response = request.timeout(WRITE_TIMEOUT).send().await?;

        match response.status() {
            StatusCode::CREATED | StatusCode::OK => {
                let created: JiraCreateResponse = response.json().await?;
                info!(key = %created.key, "Created Jira issue");
                Ok(created.key)
            }
            _ => Err(Self::upstream_error("create_ticket", response).await),
        }
    }

    async fn list_tickets(&self, owner_id: &str) -> Result<Vec<TicketListItem>> {
        let safe_owner = Self::sanitize_owner_id(owner_id);
        if safe_owner.is_empty() {
            return Ok(Vec::new());
        }

        let jql = match self.project_key.as_deref() {
            Some(project) => format!(
                "project = {} AND description ~ \"Owner ID: {}\" ORDER BY updated DESC",
                project, safe_owner
            ),
            None => format!(
                "description ~ \"Owner ID: {}\" ORDER BY updated DESC",
                safe_owner
            ),
        };

        let issues = with_retry(&RetryConfig::read_once(), "jira_list", || {
            self.search(&jql, LIST_FIELDS, LIST_MAX_RESULTS)
        })
        .await?;

        // The JQL text match is fuzzy; re-verify each hit against the
        // embedded marker before attributing it to the owner.
        Ok(issues
            .into_iter()
            .filter(|issue| {
                issue
                    .fields
                    .description
                    .as_deref()
                    .map(|d| ownership::is_owned_by(d, owner_id))
                    .unwrap_or(false)
            })
            .map(|issue| TicketListItem {
                id: issue.key.clone(),
                summary: issue.fields.summary.clone(),
                status: Self::status_of(&issue.fields.status),
                updated_at: issue.fields.updated.as_deref().and_then(parse_jira_time),
            })
            .collect())
    }

    async fn get_ticket(&self, ticket_id: &str, owner_id: &str) -> Result<Option<Ticket>> {
        let issue = with_retry(&RetryConfig::read_once(), "jira_get", || {
            self.fetch_issue(ticket_id)
        })
        .await?;

        let Some(issue) = issue else {
            return Ok(None);
        };

        let description = issue.fields.description.as_deref().unwrap_or_default();
        if !ownership::is_owned_by(description, owner_id) {
            debug!(key = %ticket_id, "Ownership mismatch on guarded fetch");
            return Ok(None);
        }

        Ok(Some(Self::project_ticket(&issue, Some(owner_id))))
    }

    async fn get_ticket_unguarded(
        &self,
        ticket_id: &str,
    ) -> Result<Option<(Ticket, Option<String>)>> {
        let issue = with_retry(&RetryConfig::read_once(), "jira_get_unguarded", || {
            self.fetch_issue(ticket_id)
        })
        .await?;

        let Some(issue) = issue else {
            return Ok(None);
        };

        let description = issue.fields.description.as_deref().unwrap_or_default();
        let owner_id = ownership::extract(description);
        let ticket = Self::project_ticket(&issue, owner_id.as_deref());
        Ok(Some((ticket, owner_id)))
    }

    async fn add_comment(
        &self,
        ticket_id: &str,
        owner_id: &str,
        body: &str,
        display_name: Option<&str>,
    ) -> Result<bool> {
        let issue = self.fetch_issue(ticket_id).await?;
        let Some(issue) = issue else {
            return Ok(false);
        };

        let description = issue.fields.description.as_deref().unwrap_or_default();
        if !ownership::is_owned_by(description, owner_id) {
            debug!(key = %ticket_id, "Ownership mismatch on add_comment");
            return Ok(false);
        }

        let url = format!("{}/issue/{}/comment", self.base_url, ticket_id);
        let comment = JiraCommentCreate {
            body: ownership::embed(body, owner_id, display_name),
        };

        info!(key = %ticket_id, "Adding comment to Jira issue");

        let request = self.apply_auth(self.client.post(&url)).json(&comment);
        let response = request.timeout(WRITE_TIMEOUT).send().await?;

        match response.status() {
            StatusCode::CREATED | StatusCode::OK => Ok(true),
            _ => Err(Self::upstream_error("add_comment", response).await),
        }
    }

    async fn transition_ticket(
        &self,
        ticket_id: &str,
        target: StatusCategory,
    ) -> Result<TransitionOutcome> {
        let url = format!("{}/issue/{}/transitions", self.base_url, ticket_id);

        let request = self.apply_auth(self.client.get(&url));
        let response = request.timeout(GET_TIMEOUT).send().await?;

        let transitions: JiraTransitionsResponse = match response.status() {
            StatusCode::OK => response.json().await?,
            _ => return Err(Self::upstream_error("get_transitions", response).await),
        };

        let Some(transition) = transitions.transitions.into_iter().find(|t| {
            t.to.status_category
                .as_ref()
                .map(|cat| StatusCategory::from_jira_key(&cat.key) == target)
                .unwrap_or(false)
        }) else {
            debug!(key = %ticket_id, ?target, "No Jira transition reaches target status");
            return Ok(TransitionOutcome::Unsupported);
        };

        info!(key = %ticket_id, transition_id = %transition.id, "Transitioning Jira issue");

        let body = JiraTransitionRequest {
            transition: JiraTransitionId { id: transition.id },
        };
        let request = self.apply_auth(self.client.post(&url)).json(&body);
        let response = request.timeout(WRITE_TIMEOUT).send().await?;

        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::OK => Ok(TransitionOutcome::Applied),
            _ => Err(Self::upstream_error("transition", response).await),
        }
    }
}
