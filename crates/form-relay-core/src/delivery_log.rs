//! # Delivery Log
//!
//! Append-only history of every delivery attempt, and the failure-window
//! policy derived from it.
//!
//! Deactivation decisions are always computed from durable log state rather
//! than in-memory counters, so they survive process restarts and are
//! consistent across concurrent dispatch workers.

use crate::destination::DestinationRef;
use crate::{DeliveryLogId, EventType, StoreError, Timestamp};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

// ============================================================================
// Log Rows
// ============================================================================

/// One delivery attempt, success or failure
///
/// Rows are never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryLog {
    pub id: DeliveryLogId,
    pub destination: DestinationRef,
    pub event: EventType,
    /// Full snapshot of the payload as sent
    pub payload: Value,
    /// HTTP status, absent on transport failure
    pub status_code: Option<u16>,
    pub success: bool,
    pub error: Option<String>,
    pub created_at: Timestamp,
}

impl DeliveryLog {
    /// Record a successful attempt
    pub fn success(
        destination: DestinationRef,
        event: EventType,
        payload: Value,
        status_code: Option<u16>,
    ) -> Self {
        Self {
            id: DeliveryLogId::new(),
            destination,
            event,
            payload,
            status_code,
            success: true,
            error: None,
            created_at: Timestamp::now(),
        }
    }

    /// Record a failed attempt
    pub fn failure(
        destination: DestinationRef,
        event: EventType,
        payload: Value,
        status_code: Option<u16>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            id: DeliveryLogId::new(),
            destination,
            event,
            payload,
            status_code,
            success: false,
            error: Some(error.into()),
            created_at: Timestamp::now(),
        }
    }
}

// ============================================================================
// Store Trait
// ============================================================================

/// Interface for persisting and querying delivery history
///
/// Appends must be safe under concurrent writers.
#[async_trait]
pub trait DeliveryLogStore: Send + Sync {
    /// Append one attempt record
    async fn append(&self, entry: DeliveryLog) -> Result<(), StoreError>;

    /// Count failed attempts for a destination at or after `since`
    async fn failures_since(
        &self,
        destination: &DestinationRef,
        since: Timestamp,
    ) -> Result<u32, StoreError>;

    /// Most recent rows for a destination, newest first
    async fn list_for_destination(
        &self,
        destination: &DestinationRef,
        limit: usize,
    ) -> Result<Vec<DeliveryLog>, StoreError>;
}

// ============================================================================
// Failure Policy
// ============================================================================

/// Trailing-window failure threshold for automatic deactivation
///
/// A destination that accumulates `threshold` failed log rows inside the
/// trailing `window` is deactivated and skipped until an account owner
/// explicitly reactivates it. The defaults (10 failures / 24 hours) are
/// product policy and configurable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FailurePolicy {
    pub threshold: u32,
    #[serde(with = "humantime_serde_seconds")]
    pub window: Duration,
}

impl FailurePolicy {
    /// Create new policy
    pub fn new(threshold: u32, window: Duration) -> Self {
        Self { threshold, window }
    }

    /// Start of the trailing window relative to `now`
    pub fn window_start(&self, now: Timestamp) -> Timestamp {
        now.subtract_duration(self.window)
    }

    /// Check whether a destination has crossed the failure threshold
    ///
    /// Computed from durable log state; a store failure is reported rather
    /// than silently treated as "healthy".
    pub async fn is_tripped(
        &self,
        store: &dyn DeliveryLogStore,
        destination: &DestinationRef,
    ) -> Result<bool, StoreError> {
        let since = self.window_start(Timestamp::now());
        let failures = store.failures_since(destination, since).await?;
        Ok(failures >= self.threshold)
    }
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self {
            threshold: 10,
            window: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Serialize the policy window as whole seconds
mod humantime_serde_seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
#[path = "delivery_log_tests.rs"]
mod tests;
