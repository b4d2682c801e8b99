//! # Delivery Dispatcher
//!
//! The transport-level delivery primitive shared by the generic-webhook and
//! REST-hook paths: sign the payload, POST it with a bounded timeout,
//! classify the outcome, and append exactly one delivery-log row.
//!
//! The signature is HMAC-SHA256 over the exact serialized JSON bytes that go
//! on the wire, hex-encoded in a signature header. Destination-configured
//! custom headers are merged in but can never override the signature or
//! event headers.

use crate::delivery_log::{DeliveryLog, DeliveryLogStore};
use crate::destination::{DestinationRef, RestHookSubscription, Secret, Webhook};
use crate::transport::{HttpTransport, OutboundRequest};
use crate::EventType;
use bytes::Bytes;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the lowercase-hex HMAC-SHA256 of the request body
pub const SIGNATURE_HEADER: &str = "X-FormRelay-Signature";

/// Header naming the event type being delivered
pub const EVENT_HEADER: &str = "X-FormRelay-Event";

// ============================================================================
// Configuration
// ============================================================================

/// Timeout budgets for outbound deliveries
///
/// Event deliveries get a longer budget than connectivity tests because they
/// may trigger downstream automation on the receiving side.
#[derive(Debug, Clone, Copy)]
pub struct DispatchConfig {
    pub deliver_timeout: Duration,
    pub test_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            deliver_timeout: Duration::from_secs(30),
            test_timeout: Duration::from_secs(10),
        }
    }
}

// ============================================================================
// Targets and Outcomes
// ============================================================================

/// Everything the dispatcher needs to deliver to one destination
#[derive(Debug, Clone)]
pub struct DeliveryTarget {
    pub destination: DestinationRef,
    pub url: String,
    pub secret: Secret,
    pub headers: HashMap<String, String>,
}

impl DeliveryTarget {
    /// Build a target from a webhook destination
    pub fn from_webhook(webhook: &Webhook) -> Self {
        Self {
            destination: webhook.destination_ref(),
            url: webhook.url.clone(),
            secret: webhook.secret.clone(),
            headers: webhook.headers.clone(),
        }
    }

    /// Build a target from a REST-hook subscription
    pub fn from_subscription(subscription: &RestHookSubscription) -> Self {
        Self {
            destination: subscription.destination_ref(),
            url: subscription.target_url.clone(),
            secret: subscription.secret.clone(),
            headers: HashMap::new(),
        }
    }
}

/// Terminal state of one dispatch attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchStatus {
    /// 2xx response received
    Delivered { status_code: u16 },
    /// Non-2xx response or transport failure
    Failed {
        status_code: Option<u16>,
        error: String,
    },
    /// Destination was over the failure threshold; no attempt was made and
    /// no log row was written
    SkippedInactive,
}

/// Per-destination result returned to the orchestrator
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub destination: DestinationRef,
    pub event: EventType,
    pub status: DispatchStatus,
}

impl DeliveryOutcome {
    /// Check for a delivered outcome
    pub fn is_success(&self) -> bool {
        matches!(self.status, DispatchStatus::Delivered { .. })
    }

    /// Check whether the destination was skipped as inactive
    pub fn is_skipped(&self) -> bool {
        matches!(self.status, DispatchStatus::SkippedInactive)
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Signs and POSTs payloads, recording every attempt
pub struct Dispatcher {
    transport: Arc<dyn HttpTransport>,
    log_store: Arc<dyn DeliveryLogStore>,
    config: DispatchConfig,
}

impl Dispatcher {
    /// Create dispatcher with default timeouts
    pub fn new(transport: Arc<dyn HttpTransport>, log_store: Arc<dyn DeliveryLogStore>) -> Self {
        Self::with_config(transport, log_store, DispatchConfig::default())
    }

    /// Create dispatcher with explicit timeout budgets
    pub fn with_config(
        transport: Arc<dyn HttpTransport>,
        log_store: Arc<dyn DeliveryLogStore>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            transport,
            log_store,
            config,
        }
    }

    /// The delivery-log store this dispatcher appends to
    pub fn log_store(&self) -> &Arc<dyn DeliveryLogStore> {
        &self.log_store
    }

    /// Compute the signature for a payload: lowercase-hex HMAC-SHA256 over
    /// the exact body bytes
    pub fn sign(secret: &Secret, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_str().as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Verify a signature in constant time
    pub fn verify(secret: &Secret, body: &[u8], signature: &str) -> bool {
        let Ok(sig_bytes) = hex::decode(signature) else {
            return false;
        };
        let mut mac = HmacSha256::new_from_slice(secret.as_str().as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(body);
        mac.verify_slice(&sig_bytes).is_ok()
    }

    /// Deliver an event payload with the standard delivery timeout
    pub async fn deliver(
        &self,
        target: &DeliveryTarget,
        event: EventType,
        payload: &Value,
    ) -> DeliveryOutcome {
        self.dispatch(target, event, payload, self.config.deliver_timeout)
            .await
    }

    /// Deliver a connectivity-test payload with the short test timeout
    pub async fn deliver_test(
        &self,
        target: &DeliveryTarget,
        event: EventType,
        payload: &Value,
    ) -> DeliveryOutcome {
        self.dispatch(target, event, payload, self.config.test_timeout)
            .await
    }

    async fn dispatch(
        &self,
        target: &DeliveryTarget,
        event: EventType,
        payload: &Value,
        timeout: Duration,
    ) -> DeliveryOutcome {
        // Serialize once; the signature must cover the exact bytes sent.
        let body = match serde_json::to_vec(payload) {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) => {
                // Payloads are engine-built JSON values, so this is an
                // invariant violation rather than a destination failure.
                error!(
                    destination = %target.destination,
                    error = %e,
                    "Failed to serialize delivery payload"
                );
                let status = DispatchStatus::Failed {
                    status_code: None,
                    error: format!("payload serialization failed: {}", e),
                };
                self.record(target, event, payload, &status).await;
                return DeliveryOutcome {
                    destination: target.destination,
                    event,
                    status,
                };
            }
        };

        let signature = Self::sign(&target.secret, &body);

        let mut request = OutboundRequest::post(&target.url)
            .with_json_bytes(body)
            .with_header(SIGNATURE_HEADER, signature)
            .with_header(EVENT_HEADER, event.as_str())
            .with_timeout(timeout);

        // Custom headers merge in last but must not shadow the reserved pair.
        for (name, value) in &target.headers {
            if name.eq_ignore_ascii_case(SIGNATURE_HEADER) || name.eq_ignore_ascii_case(EVENT_HEADER)
            {
                warn!(
                    destination = %target.destination,
                    header = %name,
                    "Ignoring custom header that would shadow a reserved delivery header"
                );
                continue;
            }
            request = request.with_header(name, value);
        }

        let status = match self.transport.execute(request).await {
            Ok(response) if response.is_success() => {
                info!(
                    destination = %target.destination,
                    event = %event,
                    status_code = response.status,
                    "Delivery succeeded"
                );
                DispatchStatus::Delivered {
                    status_code: response.status,
                }
            }
            Ok(response) => {
                warn!(
                    destination = %target.destination,
                    event = %event,
                    status_code = response.status,
                    "Delivery rejected by destination"
                );
                DispatchStatus::Failed {
                    status_code: Some(response.status),
                    error: format!("destination responded with status {}", response.status),
                }
            }
            Err(transport_error) => {
                warn!(
                    destination = %target.destination,
                    event = %event,
                    error = %transport_error,
                    "Delivery transport failure"
                );
                DispatchStatus::Failed {
                    status_code: None,
                    error: transport_error.to_string(),
                }
            }
        };

        self.record(target, event, payload, &status).await;

        DeliveryOutcome {
            destination: target.destination,
            event,
            status,
        }
    }

    /// Append exactly one log row for an attempt
    ///
    /// A store failure is logged and swallowed: the attempt already happened
    /// and the outcome must still reach the caller.
    async fn record(
        &self,
        target: &DeliveryTarget,
        event: EventType,
        payload: &Value,
        status: &DispatchStatus,
    ) {
        let entry = match status {
            DispatchStatus::Delivered { status_code } => DeliveryLog::success(
                target.destination,
                event,
                payload.clone(),
                Some(*status_code),
            ),
            DispatchStatus::Failed { status_code, error } => DeliveryLog::failure(
                target.destination,
                event,
                payload.clone(),
                *status_code,
                error.clone(),
            ),
            DispatchStatus::SkippedInactive => return,
        };

        if let Err(store_error) = self.log_store.append(entry).await {
            error!(
                destination = %target.destination,
                error = %store_error,
                "Failed to append delivery log row"
            );
        }
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
