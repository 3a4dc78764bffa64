//! Webhook HTTP server
//!
//! Receives tracker webhooks, authenticates them under two schemes
//! (HMAC signature or shared-secret token), and hands them to the
//! ingest pipeline.
//!
//! # Routes
//!
//! - `GET /health` - Liveness probe
//! - `POST /webhooks/ticketing?tenant=<id>&secret=<token>` - Inbound
//!   tracker events; the signature variant carries `X-Hub-Signature`
//!   instead of `secret`
//!
//! Responses are always `{"ok": true}` (200) except authentication
//! failure (401) and missing configuration (404). Processing failures are
//! logged and counted per tenant, never surfaced to the upstream
//! automation tool.

pub mod auth;
mod events;
mod ingest;

pub use events::{IssueRef, WebhookEventKind, WebhookPayload};
pub use ingest::{IngestOutcome, WebhookIngestor};

use crate::credentials::{Cipher, CredentialStore};
use crate::{BridgeError, Result};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, warn};

/// Tenant label used when no tenant parameter is present
const DEFAULT_TENANT: &str = "main";

/// Shared server state
struct AppState {
    ingestor: WebhookIngestor,
    store: Arc<dyn CredentialStore>,
    cipher: Arc<dyn Cipher>,
    /// Environment-level secret for the single-tenant deployment mode
    default_secret: Option<String>,
}

/// HTTP server for inbound tracker webhooks
pub struct WebhookServer {
    state: Arc<AppState>,
}

impl WebhookServer {
    pub fn new(
        ingestor: WebhookIngestor,
        store: Arc<dyn CredentialStore>,
        cipher: Arc<dyn Cipher>,
        default_secret: Option<String>,
    ) -> Self {
        Self {
            state: Arc::new(AppState {
                ingestor,
                store,
                cipher,
                default_secret,
            }),
        }
    }

    fn router(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/webhooks/ticketing", post(receive_webhook))
            .with_state(state)
    }

    /// Run the server on the given address
    pub async fn run(self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| BridgeError::Config(format!("Failed to bind {}: {}", addr, e)))?;

        tracing::info!(addr = addr, "Webhook server listening");

        axum::serve(listener, Self::router(self.state))
            .await
            .map_err(BridgeError::Io)
    }
}

/// Query parameters on the webhook route
#[derive(Debug, Deserialize)]
struct WebhookQuery {
    tenant: Option<String>,
    secret: Option<String>,
}

/// Acknowledgement body
#[derive(Debug, Serialize)]
struct WebhookAck {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    skipped: Option<bool>,
}

impl WebhookAck {
    fn handled() -> Json<Self> {
        Json(Self {
            ok: true,
            skipped: None,
        })
    }

    fn skipped() -> Json<Self> {
        Json(Self {
            ok: true,
            skipped: Some(true),
        })
    }
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn not_found() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: "webhook not configured".to_string(),
        }),
    )
}

fn unauthorized() -> (StatusCode, Json<ErrorResponse>) {
    // No detail: the caller learns nothing about which scheme failed or why
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: "unauthorized".to_string(),
        }),
    )
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Decrypted tenant-scoped webhook secret, if one is configured
async fn tenant_webhook_secret(state: &AppState, tenant_id: &str) -> Result<Option<String>> {
    let Some(credential) = state.store.get(tenant_id).await? else {
        return Ok(None);
    };
    match credential.webhook_secret_enc.as_deref() {
        Some(enc) => Ok(Some(state.cipher.decrypt(enc)?)),
        None => Ok(None),
    }
}

async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WebhookQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> std::result::Result<Json<WebhookAck>, (StatusCode, Json<ErrorResponse>)> {
    // Identify context: explicit tenant parameter or the environment-level
    // default ("main" tenant)
    let (tenant_id, expected_secret) = match query.tenant.as_deref() {
        Some(tenant) => match tenant_webhook_secret(&state, tenant).await {
            Ok(Some(secret)) => (tenant.to_string(), secret),
            Ok(None) => {
                debug!(tenant = %tenant, "No webhook secret configured for tenant");
                return Err(not_found());
            }
            Err(e) => {
                error!(tenant = %tenant, error = %e, "Webhook secret lookup failed");
                return Err(not_found());
            }
        },
        None => match state.default_secret.clone() {
            Some(secret) => (DEFAULT_TENANT.to_string(), secret),
            None => {
                debug!("No default webhook secret configured");
                return Err(not_found());
            }
        },
    };

    // Authenticate under either scheme, both constant-time
    let signature = headers
        .get("x-hub-signature")
        .and_then(|value| value.to_str().ok());
    if !auth::authenticate(&expected_secret, &body, signature, query.secret.as_deref()) {
        warn!(tenant = %tenant_id, "Webhook authentication failed");
        return Err(unauthorized());
    }

    // Shape variance from the upstream automation tool is never an error
    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            debug!(tenant = %tenant_id, error = %e, "Unparseable webhook body, acknowledging");
            return Ok(WebhookAck::skipped());
        }
    };

    match state.ingestor.handle(&tenant_id, &payload).await {
        Ok(outcome) if outcome.skipped() => Ok(WebhookAck::skipped()),
        Ok(_) => Ok(WebhookAck::handled()),
        Err(BridgeError::NotConfigured(_)) => Err(not_found()),
        Err(e) => {
            // Counted against the tenant by the ingestor; the upstream tool
            // gets an ack either way
            error!(tenant = %tenant_id, error = %e, "Webhook processing failed");
            Ok(WebhookAck::skipped())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{
        AesGcmCipher, AuthMode, MemoryCredentialStore, TenantCredential,
    };
    use crate::factory::test_stubs::{StubProvider, StubResolver};
    use crate::notify::{NotificationDispatcher, NullMessenger};
    use crate::providers::ProviderKind;
    use axum::body::Body;
    use axum::http::Request;
    use base64::Engine;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;
    use tower::ServiceExt;

    const TENANT_SECRET: &str = "tenant-hook-secret";
    const DEFAULT_SECRET: &str = "default-hook-secret";

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
    }

    async fn test_router() -> Router {
        let cipher: Arc<dyn Cipher> = Arc::new(AesGcmCipher::new("server-test-key"));
        let store = Arc::new(MemoryCredentialStore::new());

        store
            .put(TenantCredential {
                tenant_id: "acme".to_string(),
                provider: ProviderKind::Jira,
                auth_mode: AuthMode::ApiToken,
                cloud_id: None,
                cloud_url: Some("https://acme.atlassian.net".to_string()),
                account_email: Some("ops@acme.test".to_string()),
                project_key: Some("SUP".to_string()),
                access_token_enc: Some(cipher.encrypt("token").unwrap()),
                refresh_token_enc: None,
                token_expiry: None,
                webhook_secret_enc: Some(cipher.encrypt(TENANT_SECRET).unwrap()),
                connected: true,
            })
            .await
            .unwrap();

        let resolver = Arc::new(StubResolver {
            provider: Some(Arc::new(StubProvider { ticket: None })),
        });
        let dispatcher = Arc::new(NotificationDispatcher::new(Arc::new(NullMessenger)));
        let store_dyn: Arc<dyn CredentialStore> = store;
        let ingestor = WebhookIngestor::new(resolver, store_dyn.clone(), dispatcher);

        let server = WebhookServer::new(
            ingestor,
            store_dyn,
            cipher,
            Some(DEFAULT_SECRET.to_string()),
        );
        WebhookServer::router(server.state)
    }

    fn webhook_request(uri: &str, body: &str, signature: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json");
        if let Some(sig) = signature {
            builder = builder.header("X-Hub-Signature", sig);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_router().await;
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_valid_secret_token_acknowledged() {
        let app = test_router().await;
        let body = r#"{"issueKey": "SUP-1", "event": "comment_created"}"#;
        let uri = format!("/webhooks/ticketing?tenant=acme&secret={}", TENANT_SECRET);

        let response = app.oneshot(webhook_request(&uri, body, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_valid_signature_acknowledged() {
        let app = test_router().await;
        let body = r#"{"issueKey": "SUP-1", "event": "comment_created"}"#;
        let signature = sign(TENANT_SECRET, body.as_bytes());

        let response = app
            .oneshot(webhook_request(
                "/webhooks/ticketing?tenant=acme",
                body,
                Some(&signature),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_invalid_signature_and_token_rejected() {
        let app = test_router().await;
        // Well-formed payload; auth must fail regardless of payload validity
        let body = r#"{"issueKey": "SUP-1", "event": "comment_created"}"#;
        let signature = sign("wrong-secret", body.as_bytes());

        let response = app
            .oneshot(webhook_request(
                "/webhooks/ticketing?tenant=acme&secret=wrong-token",
                body,
                Some(&signature),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_tenant_is_404() {
        let app = test_router().await;
        let response = app
            .oneshot(webhook_request(
                "/webhooks/ticketing?tenant=ghost&secret=whatever",
                "{}",
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_default_tenant_uses_env_secret() {
        let app = test_router().await;
        let body = r#"{"issueKey": "SUP-1", "event": "comment_created"}"#;
        let uri = format!("/webhooks/ticketing?secret={}", DEFAULT_SECRET);

        let response = app.oneshot(webhook_request(&uri, body, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_garbage_body_still_acknowledged() {
        let app = test_router().await;
        let uri = format!("/webhooks/ticketing?tenant=acme&secret={}", TENANT_SECRET);

        let response = app
            .oneshot(webhook_request(&uri, "this is not json", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
