//! # REST-Hook Subscription Management
//!
//! CRUD for subscriptions registered by external automation platforms, and
//! the guarded trigger path that applies the failure-window policy before
//! and after each delivery.
//!
//! Destination lifecycle per subscription: active destinations stay active
//! on success; a failure is recorded and, once the trailing-window failure
//! count reaches the policy threshold, the subscription is deactivated.
//! Deactivation is terminal until the owning account explicitly
//! resubscribes.

use crate::delivery_log::FailurePolicy;
use crate::destination::RestHookSubscription;
use crate::dispatch::{DeliveryOutcome, DeliveryTarget, DispatchStatus, Dispatcher};
use crate::{AccountId, DestinationId, EventType, StoreError, ValidationError};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};

// ============================================================================
// Store Trait
// ============================================================================

/// Persistence interface for REST-hook subscriptions
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn insert(&self, subscription: RestHookSubscription) -> Result<(), StoreError>;

    /// Delete a subscription owned by the account; returns whether it existed
    async fn delete(&self, account: AccountId, id: DestinationId) -> Result<bool, StoreError>;

    /// All active subscriptions for an account
    async fn list_for_account(
        &self,
        account: AccountId,
    ) -> Result<Vec<RestHookSubscription>, StoreError>;

    /// Active subscriptions for an account and event type
    async fn active_for_event(
        &self,
        account: AccountId,
        event: EventType,
    ) -> Result<Vec<RestHookSubscription>, StoreError>;

    async fn set_active(&self, id: DestinationId, active: bool) -> Result<(), StoreError>;
}

// ============================================================================
// Errors and Results
// ============================================================================

/// Failures of the subscription management surface
#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    #[error("Subscription not found: {id}")]
    NotFound { id: DestinationId },

    #[error("Invalid event '{event}'. Valid events: {valid}")]
    InvalidEvent { event: String, valid: String },

    #[error("Invalid target URL: {0}")]
    InvalidUrl(#[from] ValidationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Response to a successful subscribe call
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionCreated {
    pub id: DestinationId,
    pub event: EventType,
}

// ============================================================================
// Subscription Manager
// ============================================================================

/// Manages REST-hook subscriptions and their guarded delivery
pub struct SubscriptionManager {
    store: Arc<dyn SubscriptionStore>,
    dispatcher: Arc<Dispatcher>,
    policy: FailurePolicy,
}

impl SubscriptionManager {
    /// Create new manager
    pub fn new(
        store: Arc<dyn SubscriptionStore>,
        dispatcher: Arc<Dispatcher>,
        policy: FailurePolicy,
    ) -> Self {
        Self {
            store,
            dispatcher,
            policy,
        }
    }

    /// Register a subscription for an account
    ///
    /// The secret is generated here and never leaves the engine except as an
    /// HMAC key.
    pub async fn subscribe(
        &self,
        account: AccountId,
        event: &str,
        target_url: &str,
        correlation: Option<String>,
    ) -> Result<SubscriptionCreated, SubscriptionError> {
        let event = EventType::from_str(event).map_err(|_| SubscriptionError::InvalidEvent {
            event: event.to_string(),
            valid: EventType::all().join(", "),
        })?;

        let subscription = RestHookSubscription::new(account, event, target_url, correlation)?;
        let created = SubscriptionCreated {
            id: subscription.id,
            event: subscription.event,
        };

        self.store.insert(subscription).await?;

        info!(
            account = %account,
            subscription = %created.id,
            event = %created.event,
            "REST-hook subscription created"
        );

        Ok(created)
    }

    /// Remove a subscription owned by the account
    pub async fn unsubscribe(
        &self,
        account: AccountId,
        id: DestinationId,
    ) -> Result<(), SubscriptionError> {
        if self.store.delete(account, id).await? {
            info!(account = %account, subscription = %id, "REST-hook subscription deleted");
            Ok(())
        } else {
            Err(SubscriptionError::NotFound { id })
        }
    }

    /// List active subscriptions for an account
    pub async fn list(
        &self,
        account: AccountId,
    ) -> Result<Vec<RestHookSubscription>, SubscriptionError> {
        Ok(self.store.list_for_account(account).await?)
    }

    /// Active subscriptions for an account and event
    pub async fn active_subscriptions(
        &self,
        account: AccountId,
        event: EventType,
    ) -> Result<Vec<RestHookSubscription>, SubscriptionError> {
        Ok(self.store.active_for_event(account, event).await?)
    }

    /// Deliver a payload to one subscription under the failure policy
    ///
    /// Skips (and deactivates) a subscription already over the threshold
    /// without a network call or log row; otherwise delivers, and
    /// deactivates when the failure that was just recorded crosses the
    /// threshold.
    pub async fn dispatch(
        &self,
        subscription: &RestHookSubscription,
        payload: &Value,
    ) -> DeliveryOutcome {
        let destination = subscription.destination_ref();

        match self
            .policy
            .is_tripped(self.dispatcher.log_store().as_ref(), &destination)
            .await
        {
            Ok(true) => {
                warn!(
                    subscription = %subscription.id,
                    threshold = self.policy.threshold,
                    "Skipping subscription over failure threshold"
                );
                self.deactivate(subscription.id).await;
                return DeliveryOutcome {
                    destination,
                    event: subscription.event,
                    status: DispatchStatus::SkippedInactive,
                };
            }
            Ok(false) => {}
            Err(store_error) => {
                // Without durable history the policy cannot be evaluated;
                // deliver anyway rather than dropping the event.
                warn!(
                    subscription = %subscription.id,
                    error = %store_error,
                    "Failure policy check unavailable; delivering without it"
                );
            }
        }

        let target = DeliveryTarget::from_subscription(subscription);
        let outcome = self
            .dispatcher
            .deliver(&target, subscription.event, payload)
            .await;

        if !outcome.is_success() {
            match self
                .policy
                .is_tripped(self.dispatcher.log_store().as_ref(), &destination)
                .await
            {
                Ok(true) => self.deactivate(subscription.id).await,
                Ok(false) => {}
                Err(store_error) => {
                    warn!(
                        subscription = %subscription.id,
                        error = %store_error,
                        "Failure policy check unavailable after failed delivery"
                    );
                }
            }
        }

        outcome
    }

    /// Deliver a payload to every active matching subscription
    ///
    /// Subscriptions are independent; one failing delivery never affects the
    /// others.
    pub async fn trigger(
        &self,
        account: AccountId,
        event: EventType,
        payload: &Value,
    ) -> Vec<DeliveryOutcome> {
        let subscriptions = match self.store.active_for_event(account, event).await {
            Ok(subs) => subs,
            Err(store_error) => {
                error!(
                    account = %account,
                    event = %event,
                    error = %store_error,
                    "Failed to load REST-hook subscriptions"
                );
                return Vec::new();
            }
        };

        let mut outcomes = Vec::with_capacity(subscriptions.len());
        for subscription in &subscriptions {
            outcomes.push(self.dispatch(subscription, payload).await);
        }
        outcomes
    }

    async fn deactivate(&self, id: DestinationId) {
        if let Err(store_error) = self.store.set_active(id, false).await {
            error!(
                subscription = %id,
                error = %store_error,
                "Failed to deactivate subscription"
            );
        } else {
            info!(subscription = %id, "Subscription deactivated by failure policy");
        }
    }
}

#[cfg(test)]
#[path = "subscription_tests.rs"]
mod tests;
