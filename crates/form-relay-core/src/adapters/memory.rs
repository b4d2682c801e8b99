//! In-memory store implementations.
//!
//! Used by tests and development setups. All stores are `Arc<RwLock<...>>`
//! maps; delivery-log appends are safe under concurrent writers, matching
//! the append-only contract.

use crate::delivery_log::{DeliveryLog, DeliveryLogStore};
use crate::destination::{
    DestinationRef, IntegrationStore, ProviderIntegration, RestHookSubscription, Secret, Webhook,
    WebhookStore,
};
use crate::subscription::SubscriptionStore;
use crate::{AccountId, DestinationId, EventType, FormId, StoreError, Timestamp};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

fn lock_poisoned() -> StoreError {
    StoreError::OperationFailed {
        message: "store lock poisoned".to_string(),
    }
}

// ============================================================================
// Delivery Log
// ============================================================================

/// In-memory append-only delivery log
#[derive(Clone, Default)]
pub struct MemoryDeliveryLogStore {
    rows: Arc<RwLock<Vec<DeliveryLog>>>,
}

impl MemoryDeliveryLogStore {
    /// Create empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of rows, for test assertions
    pub fn row_count(&self) -> usize {
        self.rows.read().map(|rows| rows.len()).unwrap_or(0)
    }
}

#[async_trait]
impl DeliveryLogStore for MemoryDeliveryLogStore {
    async fn append(&self, entry: DeliveryLog) -> Result<(), StoreError> {
        self.rows.write().map_err(|_| lock_poisoned())?.push(entry);
        Ok(())
    }

    async fn failures_since(
        &self,
        destination: &DestinationRef,
        since: Timestamp,
    ) -> Result<u32, StoreError> {
        let rows = self.rows.read().map_err(|_| lock_poisoned())?;
        Ok(rows
            .iter()
            .filter(|row| {
                row.destination == *destination && !row.success && row.created_at >= since
            })
            .count() as u32)
    }

    async fn list_for_destination(
        &self,
        destination: &DestinationRef,
        limit: usize,
    ) -> Result<Vec<DeliveryLog>, StoreError> {
        let rows = self.rows.read().map_err(|_| lock_poisoned())?;
        let mut matching: Vec<DeliveryLog> = rows
            .iter()
            .filter(|row| row.destination == *destination)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(limit);
        Ok(matching)
    }
}

// ============================================================================
// Provider Integrations
// ============================================================================

/// In-memory provider integration store
#[derive(Clone, Default)]
pub struct MemoryIntegrationStore {
    integrations: Arc<RwLock<HashMap<DestinationId, ProviderIntegration>>>,
}

impl MemoryIntegrationStore {
    /// Create empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an integration
    pub fn insert(&self, integration: ProviderIntegration) {
        if let Ok(mut integrations) = self.integrations.write() {
            integrations.insert(integration.id, integration);
        }
    }

    /// Fetch an integration by id, for test assertions
    pub fn get(&self, id: DestinationId) -> Option<ProviderIntegration> {
        self.integrations
            .read()
            .ok()
            .and_then(|integrations| integrations.get(&id).cloned())
    }
}

#[async_trait]
impl IntegrationStore for MemoryIntegrationStore {
    async fn active_for_form(
        &self,
        form: FormId,
    ) -> Result<Vec<ProviderIntegration>, StoreError> {
        let integrations = self.integrations.read().map_err(|_| lock_poisoned())?;
        Ok(integrations
            .values()
            .filter(|integration| integration.form == form && integration.active)
            .cloned()
            .collect())
    }

    async fn set_active(&self, id: DestinationId, active: bool) -> Result<(), StoreError> {
        let mut integrations = self.integrations.write().map_err(|_| lock_poisoned())?;
        if let Some(integration) = integrations.get_mut(&id) {
            integration.active = active;
        }
        Ok(())
    }
}

// ============================================================================
// Webhooks
// ============================================================================

/// In-memory webhook store
#[derive(Clone, Default)]
pub struct MemoryWebhookStore {
    webhooks: Arc<RwLock<HashMap<DestinationId, Webhook>>>,
}

impl MemoryWebhookStore {
    /// Create empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a webhook by id, for test assertions
    pub fn get_by_id(&self, id: DestinationId) -> Option<Webhook> {
        self.webhooks
            .read()
            .ok()
            .and_then(|webhooks| webhooks.get(&id).cloned())
    }
}

#[async_trait]
impl WebhookStore for MemoryWebhookStore {
    async fn insert(&self, webhook: Webhook) -> Result<(), StoreError> {
        self.webhooks
            .write()
            .map_err(|_| lock_poisoned())?
            .insert(webhook.id, webhook);
        Ok(())
    }

    async fn get(
        &self,
        account: AccountId,
        id: DestinationId,
    ) -> Result<Option<Webhook>, StoreError> {
        let webhooks = self.webhooks.read().map_err(|_| lock_poisoned())?;
        Ok(webhooks
            .get(&id)
            .filter(|webhook| webhook.account == account)
            .cloned())
    }

    async fn list_for_account(&self, account: AccountId) -> Result<Vec<Webhook>, StoreError> {
        let webhooks = self.webhooks.read().map_err(|_| lock_poisoned())?;
        Ok(webhooks
            .values()
            .filter(|webhook| webhook.account == account)
            .cloned()
            .collect())
    }

    async fn active_for_event(
        &self,
        account: AccountId,
        event: EventType,
    ) -> Result<Vec<Webhook>, StoreError> {
        let webhooks = self.webhooks.read().map_err(|_| lock_poisoned())?;
        Ok(webhooks
            .values()
            .filter(|webhook| {
                webhook.account == account && webhook.active && webhook.subscribes_to(event)
            })
            .cloned()
            .collect())
    }

    async fn set_active(&self, id: DestinationId, active: bool) -> Result<(), StoreError> {
        let mut webhooks = self.webhooks.write().map_err(|_| lock_poisoned())?;
        if let Some(webhook) = webhooks.get_mut(&id) {
            webhook.active = active;
        }
        Ok(())
    }

    async fn update_secret(
        &self,
        id: DestinationId,
        secret: Secret,
    ) -> Result<(), StoreError> {
        let mut webhooks = self.webhooks.write().map_err(|_| lock_poisoned())?;
        if let Some(webhook) = webhooks.get_mut(&id) {
            webhook.secret = secret;
        }
        Ok(())
    }
}

// ============================================================================
// REST-Hook Subscriptions
// ============================================================================

/// In-memory REST-hook subscription store
#[derive(Clone, Default)]
pub struct MemorySubscriptionStore {
    subscriptions: Arc<RwLock<HashMap<DestinationId, RestHookSubscription>>>,
}

impl MemorySubscriptionStore {
    /// Create empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a subscription by id, for test assertions
    pub fn get_by_id(&self, id: DestinationId) -> Option<RestHookSubscription> {
        self.subscriptions
            .read()
            .ok()
            .and_then(|subscriptions| subscriptions.get(&id).cloned())
    }
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
    async fn insert(&self, subscription: RestHookSubscription) -> Result<(), StoreError> {
        self.subscriptions
            .write()
            .map_err(|_| lock_poisoned())?
            .insert(subscription.id, subscription);
        Ok(())
    }

    async fn delete(&self, account: AccountId, id: DestinationId) -> Result<bool, StoreError> {
        let mut subscriptions = self.subscriptions.write().map_err(|_| lock_poisoned())?;
        let owned = subscriptions
            .get(&id)
            .map(|subscription| subscription.account == account)
            .unwrap_or(false);
        if owned {
            subscriptions.remove(&id);
        }
        Ok(owned)
    }

    async fn list_for_account(
        &self,
        account: AccountId,
    ) -> Result<Vec<RestHookSubscription>, StoreError> {
        let subscriptions = self.subscriptions.read().map_err(|_| lock_poisoned())?;
        Ok(subscriptions
            .values()
            .filter(|subscription| subscription.account == account && subscription.active)
            .cloned()
            .collect())
    }

    async fn active_for_event(
        &self,
        account: AccountId,
        event: EventType,
    ) -> Result<Vec<RestHookSubscription>, StoreError> {
        let subscriptions = self.subscriptions.read().map_err(|_| lock_poisoned())?;
        Ok(subscriptions
            .values()
            .filter(|subscription| {
                subscription.account == account
                    && subscription.active
                    && subscription.event == event
            })
            .cloned()
            .collect())
    }

    async fn set_active(&self, id: DestinationId, active: bool) -> Result<(), StoreError> {
        let mut subscriptions = self.subscriptions.write().map_err(|_| lock_poisoned())?;
        if let Some(subscription) = subscriptions.get_mut(&id) {
            subscription.active = active;
        }
        Ok(())
    }
}
