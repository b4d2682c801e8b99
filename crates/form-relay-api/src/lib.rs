//! # Form-Relay API
//!
//! HTTP surface for the distribution engine: REST-hook subscription
//! management for automation platforms, webhook destination management, and
//! provider credential checks for the configuration UI.
//!
//! Every route is authenticated by a long-lived API key (`X-Api-Key`
//! header), validated through an injected [`ApiKeyValidator`] — deliberately
//! separate from the product's session authentication, which lives outside
//! this subsystem.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{delete, get, post};
use axum::{Extension, Json, Router};
use form_relay_core::destination::{Secret, Webhook, WebhookStore};
use form_relay_core::dispatch::{DeliveryTarget, DispatchStatus, Dispatcher};
use form_relay_core::orchestrator::Orchestrator;
use form_relay_core::providers::AdapterRegistry;
use form_relay_core::submission::SubmissionEvent;
use form_relay_core::subscription::SubscriptionManager;
use form_relay_core::{
    AccountId, CredentialBundle, DestinationId, EventType, ProviderKind, Timestamp,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

pub mod errors;

pub use errors::ApiError;

// ============================================================================
// Authentication
// ============================================================================

/// Resolves an API key to the owning account
#[async_trait::async_trait]
pub trait ApiKeyValidator: Send + Sync {
    /// Return the account for a valid key, `None` otherwise
    async fn validate(&self, key: &str) -> Option<AccountId>;
}

/// Fixed key table, used by tests and development setups
#[derive(Default)]
pub struct StaticApiKeys {
    keys: HashMap<String, AccountId>,
}

impl StaticApiKeys {
    /// Create empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a key for an account
    pub fn with_key(mut self, key: impl Into<String>, account: AccountId) -> Self {
        self.keys.insert(key.into(), account);
        self
    }
}

#[async_trait::async_trait]
impl ApiKeyValidator for StaticApiKeys {
    async fn validate(&self, key: &str) -> Option<AccountId> {
        self.keys.get(key).copied()
    }
}

async fn require_api_key(
    State(state): State<ApiState>,
    mut request: axum::extract::Request,
    next: Next,
) -> Result<Response, ApiError> {
    let key = request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    let account = state
        .keys
        .validate(key)
        .await
        .ok_or(ApiError::Unauthorized)?;

    request.extensions_mut().insert(account);
    Ok(next.run(request).await)
}

// ============================================================================
// State and Router
// ============================================================================

/// Shared handler dependencies
#[derive(Clone)]
pub struct ApiState {
    pub subscriptions: Arc<SubscriptionManager>,
    pub webhooks: Arc<dyn WebhookStore>,
    pub dispatcher: Arc<Dispatcher>,
    pub registry: Arc<AdapterRegistry>,
    pub orchestrator: Arc<Orchestrator>,
    pub keys: Arc<dyn ApiKeyValidator>,
}

/// Build the authenticated API router
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/hooks", post(subscribe).get(list_subscriptions))
        .route("/hooks/:id", delete(unsubscribe))
        .route("/hooks/samples/submission", get(sample_submission))
        .route("/webhooks", get(list_webhooks).post(create_webhook))
        .route("/webhooks/:id/test", post(test_webhook))
        .route("/webhooks/:id/regenerate-secret", post(regenerate_secret))
        .route("/integrations/test", post(test_integration))
        .route("/integrations/:provider/containers", post(discover_containers))
        .route("/internal/submissions/dispatch", post(dispatch_submission))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// REST-Hook Subscriptions
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscribeRequest {
    event: String,
    hook_url: String,
    #[serde(default)]
    correlation: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionView {
    id: DestinationId,
    event: EventType,
    target_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation: Option<String>,
}

async fn subscribe(
    State(state): State<ApiState>,
    Extension(account): Extension<AccountId>,
    Json(body): Json<SubscribeRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let created = state
        .subscriptions
        .subscribe(account, &body.event, &body.hook_url, body.correlation)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": created.id, "event": created.event })),
    ))
}

async fn unsubscribe(
    State(state): State<ApiState>,
    Extension(account): Extension<AccountId>,
    Path(id): Path<DestinationId>,
) -> Result<Json<Value>, ApiError> {
    state.subscriptions.unsubscribe(account, id).await?;
    Ok(Json(json!({ "success": true })))
}

async fn list_subscriptions(
    State(state): State<ApiState>,
    Extension(account): Extension<AccountId>,
) -> Result<Json<Vec<SubscriptionView>>, ApiError> {
    let subscriptions = state.subscriptions.list(account).await?;
    Ok(Json(
        subscriptions
            .into_iter()
            .map(|subscription| SubscriptionView {
                id: subscription.id,
                event: subscription.event,
                target_url: subscription.target_url,
                correlation: subscription.correlation,
            })
            .collect(),
    ))
}

/// One-element array of sample trigger data, used by automation platforms
/// while the user wires up their first workflow
async fn sample_submission() -> Json<Value> {
    let sample = SubmissionEvent::sample();
    Json(json!([
        sample.hook_payload(EventType::SubmissionCreated, Timestamp::now())
    ]))
}

// ============================================================================
// Webhook Destinations
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateWebhookRequest {
    #[serde(default)]
    name: Option<String>,
    url: String,
    #[serde(default)]
    events: Option<HashSet<EventType>>,
    #[serde(default)]
    headers: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookView {
    id: DestinationId,
    name: String,
    url: String,
    events: Vec<EventType>,
    headers: HashMap<String, String>,
    active: bool,
}

impl WebhookView {
    fn from_webhook(webhook: &Webhook) -> Self {
        let mut events: Vec<EventType> = webhook.events.iter().copied().collect();
        events.sort_by_key(|event| event.as_str());
        Self {
            id: webhook.id,
            name: webhook.name.clone(),
            url: webhook.url.clone(),
            events,
            headers: webhook.headers.clone(),
            active: webhook.active,
        }
    }
}

async fn list_webhooks(
    State(state): State<ApiState>,
    Extension(account): Extension<AccountId>,
) -> Result<Json<Vec<WebhookView>>, ApiError> {
    let webhooks = state.webhooks.list_for_account(account).await?;
    Ok(Json(webhooks.iter().map(WebhookView::from_webhook).collect()))
}

async fn create_webhook(
    State(state): State<ApiState>,
    Extension(account): Extension<AccountId>,
    Json(body): Json<CreateWebhookRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let events = body
        .events
        .unwrap_or_else(|| HashSet::from([EventType::SubmissionCreated]));

    let webhook = Webhook::new(
        account,
        body.name.unwrap_or_else(|| "New Webhook".to_string()),
        body.url,
        events,
        body.headers,
    )?;

    // The secret is returned exactly once, at creation time.
    let mut view = serde_json::to_value(WebhookView::from_webhook(&webhook))
        .map_err(|e| ApiError::Internal {
            message: e.to_string(),
        })?;
    view["secret"] = json!(webhook.secret.as_str());

    state.webhooks.insert(webhook).await?;
    info!(account = %account, "Webhook created");

    Ok((StatusCode::CREATED, Json(view)))
}

async fn test_webhook(
    State(state): State<ApiState>,
    Extension(account): Extension<AccountId>,
    Path(id): Path<DestinationId>,
) -> Result<Json<Value>, ApiError> {
    let webhook = state
        .webhooks
        .get(account, id)
        .await?
        .ok_or(ApiError::NotFound { what: "webhook" })?;

    let payload = json!({
        "event": "test",
        "timestamp": Timestamp::now().to_rfc3339(),
        "data": { "message": "Test webhook from Form Relay" },
    });

    let target = DeliveryTarget::from_webhook(&webhook);
    let outcome = state
        .dispatcher
        .deliver_test(&target, EventType::Test, &payload)
        .await;

    Ok(Json(match outcome.status {
        DispatchStatus::Delivered { status_code } => {
            json!({ "success": true, "status": status_code })
        }
        DispatchStatus::Failed { status_code, error } => {
            json!({ "success": false, "status": status_code, "error": error })
        }
        DispatchStatus::SkippedInactive => json!({ "success": false, "error": "inactive" }),
    }))
}

async fn regenerate_secret(
    State(state): State<ApiState>,
    Extension(account): Extension<AccountId>,
    Path(id): Path<DestinationId>,
) -> Result<Json<Value>, ApiError> {
    state
        .webhooks
        .get(account, id)
        .await?
        .ok_or(ApiError::NotFound { what: "webhook" })?;

    let secret = Secret::generate();
    let exposed = secret.as_str().to_string();
    state.webhooks.update_secret(id, secret).await?;
    info!(account = %account, webhook = %id, "Webhook secret regenerated");

    Ok(Json(json!({ "secret": exposed })))
}

// ============================================================================
// Provider Credential Checks & Discovery
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TestIntegrationRequest {
    #[serde(rename = "type")]
    provider: String,
    credentials: CredentialBundle,
}

async fn test_integration(
    State(state): State<ApiState>,
    Json(body): Json<TestIntegrationRequest>,
) -> Result<Json<Value>, ApiError> {
    let kind = parse_provider(&body.provider)?;
    let adapter = state.registry.get(kind).ok_or(ApiError::BadRequest {
        message: format!("no adapter registered for {}", kind),
    })?;

    let check = adapter.test_identity(&body.credentials).await;
    Ok(Json(serde_json::to_value(check).map_err(|e| {
        ApiError::Internal {
            message: e.to_string(),
        }
    })?))
}

#[derive(Debug, Deserialize)]
struct DiscoverQuery {
    #[serde(default)]
    parent: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DiscoverRequest {
    credentials: CredentialBundle,
}

async fn discover_containers(
    State(state): State<ApiState>,
    Path(provider): Path<String>,
    Query(query): Query<DiscoverQuery>,
    Json(body): Json<DiscoverRequest>,
) -> Result<Json<Value>, ApiError> {
    let kind = parse_provider(&provider)?;
    let adapter = state.registry.get(kind).ok_or(ApiError::BadRequest {
        message: format!("no adapter registered for {}", kind),
    })?;

    let containers = adapter
        .discover(&body.credentials, query.parent.as_deref())
        .await?;
    Ok(Json(serde_json::to_value(containers).map_err(|e| {
        ApiError::Internal {
            message: e.to_string(),
        }
    })?))
}

fn parse_provider(raw: &str) -> Result<ProviderKind, ApiError> {
    ProviderKind::from_str(raw).map_err(|_| ApiError::BadRequest {
        message: format!("unknown integration type '{}'", raw),
    })
}

// ============================================================================
// Submission Dispatch (internal)
// ============================================================================

/// Entry point for the submission pipeline: fan a completed submission out
/// and report per-destination outcomes. The submission itself is already
/// durably stored by the caller; this call never fails the pipeline.
async fn dispatch_submission(
    State(state): State<ApiState>,
    Extension(account): Extension<AccountId>,
    Json(mut event): Json<SubmissionEvent>,
) -> Json<Value> {
    // The authenticated account owns the dispatch regardless of what the
    // payload claims.
    event.account_id = account;

    let result = state.orchestrator.process_submission(&event).await;

    let providers: Vec<Value> = result
        .provider_results
        .iter()
        .map(|r| {
            json!({
                "integration": r.integration,
                "type": r.provider,
                "success": r.success,
                "skippedInactive": r.skipped_inactive,
                "detail": r.detail,
                "error": r.error,
            })
        })
        .collect();

    let webhooks: Vec<Value> = result
        .webhook_results
        .iter()
        .map(|outcome| {
            let (success, status_code, error, skipped) = match &outcome.status {
                DispatchStatus::Delivered { status_code } => {
                    (true, Some(*status_code), None, false)
                }
                DispatchStatus::Failed { status_code, error } => {
                    (false, *status_code, Some(error.clone()), false)
                }
                DispatchStatus::SkippedInactive => (false, None, None, true),
            };
            json!({
                "destination": outcome.destination.to_string(),
                "kind": outcome.destination.kind,
                "success": success,
                "statusCode": status_code,
                "skippedInactive": skipped,
                "error": error,
            })
        })
        .collect();

    Json(json!({
        "providers": providers,
        "webhooks": webhooks,
        "destinationCount": result.destination_count(),
        "failureCount": result.failure_count(),
    }))
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
