//! # Submission Orchestrator
//!
//! Fans one completed submission out to every active destination: provider
//! integrations linked to the form, generic webhooks for the owning account,
//! and REST-hook subscriptions for the account.
//!
//! Every destination is an independent, fault-isolated unit of work. Units
//! run concurrently under a configurable cap, and a failure (or panic) in
//! one unit is folded into the aggregate result without affecting the
//! others. `process_submission` never returns an error: partial failure is a
//! normal, reportable outcome.
//!
//! Units are spawned as detached tasks, so if the caller is cancelled,
//! in-flight attempts still complete and write their log rows.

use crate::delivery_log::{DeliveryLog, DeliveryLogStore, FailurePolicy};
use crate::destination::{
    DestinationRef, IntegrationStore, ProviderIntegration, ProviderKind, WebhookStore,
};
use crate::dispatch::{DeliveryOutcome, DeliveryTarget, DispatchStatus, Dispatcher};
use crate::providers::AdapterRegistry;
use crate::submission::SubmissionEvent;
use crate::subscription::SubscriptionManager;
use crate::{DestinationId, EventType, Timestamp};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

// ============================================================================
// Results
// ============================================================================

/// Outcome of one provider integration push
#[derive(Debug, Clone)]
pub struct ProviderDispatchResult {
    pub integration: DestinationId,
    pub provider: ProviderKind,
    pub success: bool,
    /// Destination was over the failure threshold; no attempt was made
    pub skipped_inactive: bool,
    pub detail: Option<String>,
    pub error: Option<String>,
}

impl ProviderDispatchResult {
    fn success(integration: &ProviderIntegration, detail: Option<String>) -> Self {
        Self {
            integration: integration.id,
            provider: integration.provider,
            success: true,
            skipped_inactive: false,
            detail,
            error: None,
        }
    }

    fn failure(integration: &ProviderIntegration, error: impl Into<String>) -> Self {
        Self {
            integration: integration.id,
            provider: integration.provider,
            success: false,
            skipped_inactive: false,
            detail: None,
            error: Some(error.into()),
        }
    }

    fn skipped(integration: &ProviderIntegration) -> Self {
        Self {
            integration: integration.id,
            provider: integration.provider,
            success: false,
            skipped_inactive: true,
            detail: None,
            error: None,
        }
    }
}

/// Combined per-destination report for one submission event
///
/// Webhook results cover both generic webhooks and REST-hook subscriptions;
/// the destination reference distinguishes them.
#[derive(Debug, Clone, Default)]
pub struct AggregateResult {
    pub provider_results: Vec<ProviderDispatchResult>,
    pub webhook_results: Vec<DeliveryOutcome>,
}

impl AggregateResult {
    /// Total number of destinations reported on
    pub fn destination_count(&self) -> usize {
        self.provider_results.len() + self.webhook_results.len()
    }

    /// Check whether every attempted destination succeeded
    pub fn is_complete_success(&self) -> bool {
        self.provider_results.iter().all(|r| r.success || r.skipped_inactive)
            && self
                .webhook_results
                .iter()
                .all(|r| r.is_success() || r.is_skipped())
    }

    /// Number of failed destinations
    pub fn failure_count(&self) -> usize {
        let providers = self
            .provider_results
            .iter()
            .filter(|r| !r.success && !r.skipped_inactive)
            .count();
        let webhooks = self
            .webhook_results
            .iter()
            .filter(|r| !r.is_success() && !r.is_skipped())
            .count();
        providers + webhooks
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Fan-out tuning
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    /// Maximum concurrently executing destination units
    pub concurrency: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { concurrency: 8 }
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Coordinates the fan-out for one completed submission
pub struct Orchestrator {
    integrations: Arc<dyn IntegrationStore>,
    webhooks: Arc<dyn WebhookStore>,
    subscriptions: Arc<SubscriptionManager>,
    registry: Arc<AdapterRegistry>,
    dispatcher: Arc<Dispatcher>,
    policy: FailurePolicy,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Create new orchestrator
    pub fn new(
        integrations: Arc<dyn IntegrationStore>,
        webhooks: Arc<dyn WebhookStore>,
        subscriptions: Arc<SubscriptionManager>,
        registry: Arc<AdapterRegistry>,
        dispatcher: Arc<Dispatcher>,
        policy: FailurePolicy,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            integrations,
            webhooks,
            subscriptions,
            registry,
            dispatcher,
            policy,
            config,
        }
    }

    /// Fan a completed submission out to all active destinations
    ///
    /// Returns one result entry per destination. Never raises: storage
    /// failures produce empty destination lists, destination failures
    /// produce failure entries, and panics in adapter code are contained to
    /// their unit.
    pub async fn process_submission(&self, event: &SubmissionEvent) -> AggregateResult {
        let event = Arc::new(event.clone());
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let sent_at = Timestamp::now();

        info!(
            submission = %event.submission_id,
            form = %event.form_id,
            "Processing submission fan-out"
        );

        let provider_handles = self.spawn_provider_units(&event, &semaphore).await;
        let webhook_handles = self.spawn_webhook_units(&event, &semaphore, sent_at).await;
        let hook_handles = self.spawn_hook_units(&event, &semaphore, sent_at).await;

        let mut result = AggregateResult::default();

        for (integration, handle) in provider_handles {
            match handle.await {
                Ok(unit_result) => result.provider_results.push(unit_result),
                Err(join_error) => {
                    // A panicking adapter is a failure of that destination only.
                    error!(
                        integration = %integration.id,
                        provider = %integration.provider,
                        error = %join_error,
                        "Provider unit aborted"
                    );
                    result.provider_results.push(ProviderDispatchResult::failure(
                        &integration,
                        format!("internal error: {}", join_error),
                    ));
                }
            }
        }

        for (destination, event_type, handle) in webhook_handles.into_iter().chain(hook_handles) {
            match handle.await {
                Ok(outcome) => result.webhook_results.push(outcome),
                Err(join_error) => {
                    error!(
                        destination = %destination,
                        error = %join_error,
                        "Delivery unit aborted"
                    );
                    result.webhook_results.push(DeliveryOutcome {
                        destination,
                        event: event_type,
                        status: DispatchStatus::Failed {
                            status_code: None,
                            error: format!("internal error: {}", join_error),
                        },
                    });
                }
            }
        }

        info!(
            submission = %event.submission_id,
            destinations = result.destination_count(),
            failures = result.failure_count(),
            "Submission fan-out complete"
        );

        result
    }

    async fn spawn_provider_units(
        &self,
        event: &Arc<SubmissionEvent>,
        semaphore: &Arc<Semaphore>,
    ) -> Vec<(ProviderIntegration, JoinHandle<ProviderDispatchResult>)> {
        let integrations = match self.integrations.active_for_form(event.form_id).await {
            Ok(list) => list,
            Err(store_error) => {
                error!(
                    form = %event.form_id,
                    error = %store_error,
                    "Failed to load provider integrations; skipping provider fan-out"
                );
                Vec::new()
            }
        };

        integrations
            .into_iter()
            .map(|integration| {
                let handle = tokio::spawn(Self::run_provider_unit(
                    integration.clone(),
                    event.clone(),
                    self.registry.clone(),
                    self.integrations.clone(),
                    self.dispatcher.log_store().clone(),
                    self.policy,
                    semaphore.clone(),
                ));
                (integration, handle)
            })
            .collect()
    }

    async fn run_provider_unit(
        integration: ProviderIntegration,
        event: Arc<SubmissionEvent>,
        registry: Arc<AdapterRegistry>,
        integrations: Arc<dyn IntegrationStore>,
        log_store: Arc<dyn DeliveryLogStore>,
        policy: FailurePolicy,
        semaphore: Arc<Semaphore>,
    ) -> ProviderDispatchResult {
        let _permit = semaphore.acquire_owned().await.ok();
        let destination = integration.destination_ref();

        match policy.is_tripped(log_store.as_ref(), &destination).await {
            Ok(true) => {
                warn!(
                    integration = %integration.id,
                    provider = %integration.provider,
                    "Skipping integration over failure threshold"
                );
                if let Err(e) = integrations.set_active(integration.id, false).await {
                    error!(integration = %integration.id, error = %e, "Failed to deactivate integration");
                }
                return ProviderDispatchResult::skipped(&integration);
            }
            Ok(false) => {}
            Err(store_error) => {
                warn!(
                    integration = %integration.id,
                    error = %store_error,
                    "Failure policy check unavailable; pushing without it"
                );
            }
        }

        let Some(adapter) = registry.get(integration.provider) else {
            return ProviderDispatchResult::failure(
                &integration,
                format!("no adapter registered for {}", integration.provider),
            );
        };

        // Log payload snapshots record what the adapter worked from.
        let payload: Value = json!(event.labeled_answers());

        let (unit_result, log_entry) = match adapter.push(&integration, &event).await {
            Ok(receipt) => {
                info!(
                    integration = %integration.id,
                    provider = %integration.provider,
                    record = receipt.record_id.as_deref().unwrap_or("-"),
                    "Provider push succeeded"
                );
                let detail = receipt.detail.or(receipt.record_id);
                (
                    ProviderDispatchResult::success(&integration, detail),
                    DeliveryLog::success(destination, EventType::SubmissionCreated, payload, None),
                )
            }
            Err(provider_error) => {
                warn!(
                    integration = %integration.id,
                    provider = %integration.provider,
                    error = %provider_error,
                    "Provider push failed"
                );
                (
                    ProviderDispatchResult::failure(&integration, provider_error.to_string()),
                    DeliveryLog::failure(
                        destination,
                        EventType::SubmissionCreated,
                        payload,
                        None,
                        provider_error.to_string(),
                    ),
                )
            }
        };

        if let Err(store_error) = log_store.append(log_entry).await {
            error!(
                integration = %integration.id,
                error = %store_error,
                "Failed to append delivery log row"
            );
        }

        if !unit_result.success {
            match policy.is_tripped(log_store.as_ref(), &destination).await {
                Ok(true) => {
                    if let Err(e) = integrations.set_active(integration.id, false).await {
                        error!(integration = %integration.id, error = %e, "Failed to deactivate integration");
                    } else {
                        info!(
                            integration = %integration.id,
                            "Integration deactivated by failure policy"
                        );
                    }
                }
                Ok(false) => {}
                Err(store_error) => {
                    warn!(
                        integration = %integration.id,
                        error = %store_error,
                        "Failure policy check unavailable after failed push"
                    );
                }
            }
        }

        unit_result
    }

    async fn spawn_webhook_units(
        &self,
        event: &Arc<SubmissionEvent>,
        semaphore: &Arc<Semaphore>,
        sent_at: Timestamp,
    ) -> Vec<(DestinationRef, EventType, JoinHandle<DeliveryOutcome>)> {
        let webhooks = match self
            .webhooks
            .active_for_event(event.account_id, EventType::SubmissionCreated)
            .await
        {
            Ok(list) => list,
            Err(store_error) => {
                error!(
                    account = %event.account_id,
                    error = %store_error,
                    "Failed to load webhooks; skipping webhook fan-out"
                );
                Vec::new()
            }
        };

        let payload = Arc::new(event.webhook_envelope(EventType::SubmissionCreated, sent_at));

        webhooks
            .into_iter()
            .map(|webhook| {
                let destination = webhook.destination_ref();
                let handle = tokio::spawn(Self::run_webhook_unit(
                    webhook,
                    payload.clone(),
                    self.dispatcher.clone(),
                    self.webhooks.clone(),
                    self.policy,
                    semaphore.clone(),
                ));
                (destination, EventType::SubmissionCreated, handle)
            })
            .collect()
    }

    async fn run_webhook_unit(
        webhook: crate::destination::Webhook,
        payload: Arc<Value>,
        dispatcher: Arc<Dispatcher>,
        webhooks: Arc<dyn WebhookStore>,
        policy: FailurePolicy,
        semaphore: Arc<Semaphore>,
    ) -> DeliveryOutcome {
        let _permit = semaphore.acquire_owned().await.ok();
        let destination = webhook.destination_ref();

        match policy
            .is_tripped(dispatcher.log_store().as_ref(), &destination)
            .await
        {
            Ok(true) => {
                warn!(
                    webhook = %webhook.id,
                    "Skipping webhook over failure threshold"
                );
                if let Err(e) = webhooks.set_active(webhook.id, false).await {
                    error!(webhook = %webhook.id, error = %e, "Failed to deactivate webhook");
                }
                return DeliveryOutcome {
                    destination,
                    event: EventType::SubmissionCreated,
                    status: DispatchStatus::SkippedInactive,
                };
            }
            Ok(false) => {}
            Err(store_error) => {
                warn!(
                    webhook = %webhook.id,
                    error = %store_error,
                    "Failure policy check unavailable; delivering without it"
                );
            }
        }

        let target = DeliveryTarget::from_webhook(&webhook);
        let outcome = dispatcher
            .deliver(&target, EventType::SubmissionCreated, &payload)
            .await;

        if !outcome.is_success() {
            match policy
                .is_tripped(dispatcher.log_store().as_ref(), &destination)
                .await
            {
                Ok(true) => {
                    if let Err(e) = webhooks.set_active(webhook.id, false).await {
                        error!(webhook = %webhook.id, error = %e, "Failed to deactivate webhook");
                    } else {
                        info!(webhook = %webhook.id, "Webhook deactivated by failure policy");
                    }
                }
                Ok(false) => {}
                Err(store_error) => {
                    warn!(
                        webhook = %webhook.id,
                        error = %store_error,
                        "Failure policy check unavailable after failed delivery"
                    );
                }
            }
        }

        outcome
    }

    async fn spawn_hook_units(
        &self,
        event: &Arc<SubmissionEvent>,
        semaphore: &Arc<Semaphore>,
        sent_at: Timestamp,
    ) -> Vec<(DestinationRef, EventType, JoinHandle<DeliveryOutcome>)> {
        let subscriptions = match self
            .subscriptions
            .active_subscriptions(event.account_id, EventType::SubmissionCreated)
            .await
        {
            Ok(list) => list,
            Err(subscription_error) => {
                error!(
                    account = %event.account_id,
                    error = %subscription_error,
                    "Failed to load REST-hook subscriptions; skipping hook fan-out"
                );
                Vec::new()
            }
        };

        let payload = Arc::new(event.hook_payload(EventType::SubmissionCreated, sent_at));

        subscriptions
            .into_iter()
            .map(|subscription| {
                let destination = subscription.destination_ref();
                let manager = self.subscriptions.clone();
                let payload = payload.clone();
                let semaphore = semaphore.clone();
                let handle = tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    manager.dispatch(&subscription, &payload).await
                });
                (destination, EventType::SubmissionCreated, handle)
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
