//! Tests for the submission fan-out orchestrator

use super::*;
use crate::adapters::{
    MemoryDeliveryLogStore, MemoryIntegrationStore, MemorySubscriptionStore, MemoryWebhookStore,
};
use crate::destination::{CredentialBundle, IntegrationSettings, Secret, Webhook};
use crate::providers::{IdentityCheck, ProviderAdapter, ProviderError, PushReceipt, TargetContainer};
use crate::submission::FieldKind;
use crate::test_support::{make_event, FakeTransport};
use crate::{AccountId, StoreError};
use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

// ============================================================================
// Scripted Adapter
// ============================================================================

/// Adapter double whose push behavior is fixed at construction
struct ScriptedAdapter {
    kind: ProviderKind,
    behavior: Behavior,
}

enum Behavior {
    Succeed,
    Fail,
    Panic,
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn test_identity(&self, _credentials: &CredentialBundle) -> IdentityCheck {
        IdentityCheck::ok("scripted")
    }

    async fn push(
        &self,
        _integration: &ProviderIntegration,
        _event: &SubmissionEvent,
    ) -> Result<PushReceipt, ProviderError> {
        match self.behavior {
            Behavior::Succeed => Ok(PushReceipt::with_record("rec-1")),
            Behavior::Fail => Err(ProviderError::Configuration {
                provider: self.kind,
                message: "invalid credentials".to_string(),
            }),
            Behavior::Panic => panic!("adapter blew up"),
        }
    }

    async fn discover(
        &self,
        _credentials: &CredentialBundle,
        _parent: Option<&str>,
    ) -> Result<Vec<TargetContainer>, ProviderError> {
        Ok(Vec::new())
    }
}

// ============================================================================
// Fixture
// ============================================================================

struct Fixture {
    orchestrator: Orchestrator,
    integrations: Arc<MemoryIntegrationStore>,
    webhooks: Arc<MemoryWebhookStore>,
    log_store: Arc<MemoryDeliveryLogStore>,
    transport: FakeTransport,
    manager: Arc<SubscriptionManager>,
}

fn fixture_with(policy: FailurePolicy, adapters: Vec<ScriptedAdapter>) -> Fixture {
    let transport = FakeTransport::new();
    let integrations = Arc::new(MemoryIntegrationStore::new());
    let webhooks = Arc::new(MemoryWebhookStore::new());
    let subscriptions = Arc::new(MemorySubscriptionStore::new());
    let log_store = Arc::new(MemoryDeliveryLogStore::new());
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(transport.clone()),
        log_store.clone(),
    ));
    let manager = Arc::new(SubscriptionManager::new(
        subscriptions.clone(),
        dispatcher.clone(),
        policy,
    ));

    let mut registry = AdapterRegistry::new();
    for adapter in adapters {
        registry.register(Arc::new(adapter));
    }

    let orchestrator = Orchestrator::new(
        integrations.clone(),
        webhooks.clone(),
        manager.clone(),
        Arc::new(registry),
        dispatcher,
        policy,
        OrchestratorConfig::default(),
    );

    Fixture {
        orchestrator,
        integrations,
        webhooks,
        log_store,
        transport,
        manager,
    }
}

fn fixture(adapters: Vec<ScriptedAdapter>) -> Fixture {
    fixture_with(FailurePolicy::default(), adapters)
}

fn sample_event(account: AccountId) -> SubmissionEvent {
    let mut event = make_event(vec![
        ("Name", FieldKind::ShortText, json!("Ann")),
        ("Email", FieldKind::Email, json!("ann@x.com")),
    ]);
    event.account_id = account;
    event
}

fn insert_integration(fx: &Fixture, event: &SubmissionEvent, provider: ProviderKind) -> DestinationId {
    let integration = ProviderIntegration {
        id: DestinationId::new(),
        account: event.account_id,
        form: event.form_id,
        provider,
        credentials: CredentialBundle::ApiKey {
            key: Secret::from_string("key-us1".to_string()),
        },
        settings: IntegrationSettings::default(),
        active: true,
    };
    let id = integration.id;
    fx.integrations.insert(integration);
    id
}

async fn insert_webhook(fx: &Fixture, account: AccountId) -> Webhook {
    let webhook = Webhook::new(
        account,
        "hook",
        "https://receiver.example.com/hook",
        HashSet::from([EventType::SubmissionCreated]),
        HashMap::new(),
    )
    .unwrap();
    fx.webhooks.insert(webhook.clone()).await.unwrap();
    webhook
}

// ============================================================================
// Fan-Out Tests
// ============================================================================

#[tokio::test]
async fn test_result_entry_per_destination() {
    let fx = fixture(vec![ScriptedAdapter {
        kind: ProviderKind::Mailchimp,
        behavior: Behavior::Succeed,
    }]);
    let account = AccountId::new();
    let event = sample_event(account);

    insert_integration(&fx, &event, ProviderKind::Mailchimp);
    insert_webhook(&fx, account).await;
    fx.manager
        .subscribe(account, "submission.created", "https://zap.example.com/catch", None)
        .await
        .unwrap();

    let result = fx.orchestrator.process_submission(&event).await;

    assert_eq!(result.destination_count(), 3);
    assert_eq!(result.provider_results.len(), 1);
    assert_eq!(result.webhook_results.len(), 2);
    assert!(result.is_complete_success());
    assert_eq!(result.failure_count(), 0);
}

#[tokio::test]
async fn test_one_failing_destination_does_not_affect_others() {
    let fx = fixture(vec![
        ScriptedAdapter {
            kind: ProviderKind::Mailchimp,
            behavior: Behavior::Fail,
        },
        ScriptedAdapter {
            kind: ProviderKind::Hubspot,
            behavior: Behavior::Succeed,
        },
    ]);
    let account = AccountId::new();
    let event = sample_event(account);

    insert_integration(&fx, &event, ProviderKind::Mailchimp);
    insert_integration(&fx, &event, ProviderKind::Hubspot);

    let result = fx.orchestrator.process_submission(&event).await;

    assert_eq!(result.provider_results.len(), 2);
    assert_eq!(result.failure_count(), 1);

    let failed = result
        .provider_results
        .iter()
        .find(|r| r.provider == ProviderKind::Mailchimp)
        .unwrap();
    assert!(!failed.success);
    assert!(failed.error.as_deref().unwrap().contains("invalid credentials"));

    let succeeded = result
        .provider_results
        .iter()
        .find(|r| r.provider == ProviderKind::Hubspot)
        .unwrap();
    assert!(succeeded.success);
}

#[tokio::test]
async fn test_panicking_adapter_is_contained() {
    let fx = fixture(vec![
        ScriptedAdapter {
            kind: ProviderKind::Notion,
            behavior: Behavior::Panic,
        },
        ScriptedAdapter {
            kind: ProviderKind::Hubspot,
            behavior: Behavior::Succeed,
        },
    ]);
    let account = AccountId::new();
    let event = sample_event(account);

    insert_integration(&fx, &event, ProviderKind::Notion);
    insert_integration(&fx, &event, ProviderKind::Hubspot);

    let result = fx.orchestrator.process_submission(&event).await;

    assert_eq!(result.provider_results.len(), 2);
    assert_eq!(result.failure_count(), 1);
    let panicked = result
        .provider_results
        .iter()
        .find(|r| r.provider == ProviderKind::Notion)
        .unwrap();
    assert!(!panicked.success);
    assert!(panicked.error.is_some());
}

#[tokio::test]
async fn test_unregistered_provider_reports_failure() {
    let fx = fixture(Vec::new());
    let account = AccountId::new();
    let event = sample_event(account);
    insert_integration(&fx, &event, ProviderKind::Slack);

    let result = fx.orchestrator.process_submission(&event).await;

    assert_eq!(result.provider_results.len(), 1);
    assert!(result.provider_results[0]
        .error
        .as_deref()
        .unwrap()
        .contains("no adapter registered"));
}

#[tokio::test]
async fn test_provider_attempts_are_logged() {
    let fx = fixture(vec![ScriptedAdapter {
        kind: ProviderKind::Mailchimp,
        behavior: Behavior::Fail,
    }]);
    let account = AccountId::new();
    let event = sample_event(account);
    let integration_id = insert_integration(&fx, &event, ProviderKind::Mailchimp);

    fx.orchestrator.process_submission(&event).await;

    let destination = fx
        .integrations
        .get(integration_id)
        .unwrap()
        .destination_ref();
    let rows = fx
        .log_store
        .list_for_destination(&destination, 10)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert!(!rows[0].success);
    assert!(rows[0].payload.get("Email").is_some(), "payload snapshot kept");
}

#[tokio::test]
async fn test_webhook_delivery_uses_envelope_and_signature() {
    let fx = fixture(Vec::new());
    let account = AccountId::new();
    let event = sample_event(account);
    let webhook = insert_webhook(&fx, account).await;

    fx.orchestrator.process_submission(&event).await;

    assert_eq!(fx.transport.request_count(), 1);
    let request = &fx.transport.requests()[0];
    let body: serde_json::Value = serde_json::from_slice(request.body.as_ref().unwrap()).unwrap();
    assert_eq!(body["event"], "submission.created");
    assert_eq!(body["form"]["id"], event.form_id.to_string());
    assert!(body["submission"]["answers"].is_null(), "webhook envelope is not flattened");

    let signature = fx
        .transport
        .header(0, crate::dispatch::SIGNATURE_HEADER)
        .unwrap();
    assert_eq!(
        Dispatcher::sign(&webhook.secret, request.body.as_ref().unwrap()),
        signature
    );
}

#[tokio::test]
async fn test_hook_delivery_uses_flattened_payload() {
    let fx = fixture(Vec::new());
    let account = AccountId::new();
    let event = sample_event(account);
    fx.manager
        .subscribe(account, "submission.created", "https://zap.example.com/catch", None)
        .await
        .unwrap();

    fx.orchestrator.process_submission(&event).await;

    assert_eq!(fx.transport.request_count(), 1);
    let body: serde_json::Value =
        serde_json::from_slice(fx.transport.requests()[0].body.as_ref().unwrap()).unwrap();
    let answers = body["submission"]["answers"].as_array().unwrap();
    assert_eq!(answers.len(), 2);
    assert_eq!(answers[0]["fieldLabel"], "Name");
}

#[tokio::test]
async fn test_inactive_webhook_not_dispatched() {
    let fx = fixture(Vec::new());
    let account = AccountId::new();
    let event = sample_event(account);
    let webhook = insert_webhook(&fx, account).await;
    fx.webhooks.set_active(webhook.id, false).await.unwrap();

    let result = fx.orchestrator.process_submission(&event).await;

    assert_eq!(result.webhook_results.len(), 0);
    assert_eq!(fx.transport.request_count(), 0);
}

#[tokio::test]
async fn test_tripped_webhook_skipped_and_marked_inactive() {
    let fx = fixture_with(FailurePolicy::new(10, Duration::from_secs(24 * 3600)), Vec::new());
    let account = AccountId::new();
    let event = sample_event(account);
    let webhook = insert_webhook(&fx, account).await;

    // Ten failed rows inside the trailing window.
    for _ in 0..10 {
        fx.log_store
            .append(crate::delivery_log::DeliveryLog::failure(
                webhook.destination_ref(),
                EventType::SubmissionCreated,
                json!({}),
                Some(500),
                "boom",
            ))
            .await
            .unwrap();
    }
    let rows_before = fx.log_store.row_count();

    let result = fx.orchestrator.process_submission(&event).await;

    assert_eq!(result.webhook_results.len(), 1);
    assert!(result.webhook_results[0].is_skipped(), "11th attempt skipped");
    assert_eq!(fx.transport.request_count(), 0, "no network call");
    assert_eq!(fx.log_store.row_count(), rows_before, "no new log row");
    assert!(!fx.webhooks.get_by_id(webhook.id).unwrap().active);
}

#[tokio::test]
async fn test_repeated_webhook_failures_deactivate() {
    let fx = fixture_with(FailurePolicy::new(3, Duration::from_secs(24 * 3600)), Vec::new());
    let account = AccountId::new();
    let event = sample_event(account);
    let webhook = insert_webhook(&fx, account).await;

    for _ in 0..3 {
        fx.transport.push_response(500, json!({}));
        fx.orchestrator.process_submission(&event).await;
    }

    assert!(!fx.webhooks.get_by_id(webhook.id).unwrap().active);

    // Subsequent dispatch skips it entirely (loaded as inactive).
    let requests_before = fx.transport.request_count();
    let result = fx.orchestrator.process_submission(&event).await;
    assert_eq!(result.webhook_results.len(), 0);
    assert_eq!(fx.transport.request_count(), requests_before);
}

#[tokio::test]
async fn test_store_failure_produces_empty_fanout_not_error() {
    // An integration store that always fails.
    struct BrokenStore;

    #[async_trait]
    impl crate::destination::IntegrationStore for BrokenStore {
        async fn active_for_form(
            &self,
            _form: crate::FormId,
        ) -> Result<Vec<ProviderIntegration>, StoreError> {
            Err(StoreError::Unavailable {
                message: "db down".to_string(),
            })
        }

        async fn set_active(&self, _id: DestinationId, _active: bool) -> Result<(), StoreError> {
            Ok(())
        }
    }

    let fx = fixture(Vec::new());
    let account = AccountId::new();
    let event = sample_event(account);

    let transport = FakeTransport::new();
    let log_store = Arc::new(MemoryDeliveryLogStore::new());
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(transport), log_store));
    let orchestrator = Orchestrator::new(
        Arc::new(BrokenStore),
        fx.webhooks.clone(),
        fx.manager.clone(),
        Arc::new(AdapterRegistry::new()),
        dispatcher,
        FailurePolicy::default(),
        OrchestratorConfig::default(),
    );

    let result = orchestrator.process_submission(&event).await;
    assert_eq!(result.provider_results.len(), 0);
}

#[tokio::test]
async fn test_concurrency_cap_of_one_still_completes_all() {
    let fx = fixture_with(FailurePolicy::default(), Vec::new());
    let account = AccountId::new();
    let event = sample_event(account);
    for _ in 0..4 {
        insert_webhook(&fx, account).await;
    }

    let orchestrator = Orchestrator::new(
        fx.integrations.clone(),
        fx.webhooks.clone(),
        fx.manager.clone(),
        Arc::new(AdapterRegistry::new()),
        Arc::new(Dispatcher::new(
            Arc::new(fx.transport.clone()),
            fx.log_store.clone(),
        )),
        FailurePolicy::default(),
        OrchestratorConfig { concurrency: 1 },
    );

    let result = orchestrator.process_submission(&event).await;
    assert_eq!(result.webhook_results.len(), 4);
    assert_eq!(fx.transport.request_count(), 4);
}
