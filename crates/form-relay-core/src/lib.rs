//! # Form-Relay Core
//!
//! Core business logic for the Form-Relay submission event distribution
//! engine.
//!
//! This crate contains the domain logic for fanning a completed form
//! submission out to heterogeneous destinations: third-party provider
//! integrations, user-configured webhooks, and REST-hook subscriptions
//! registered by automation platforms. Every delivery attempt is recorded in
//! an append-only delivery log, which also drives the automatic deactivation
//! policy for repeatedly failing destinations.
//!
//! ## Architecture
//!
//! The core follows clean architecture principles:
//! - Business logic depends only on trait abstractions
//! - Infrastructure implementations are injected at runtime
//! - All external dependencies (HTTP transport, persistence) are abstracted
//!   behind traits
//!
//! ## Usage
//!
//! ```rust
//! use form_relay_core::{AccountId, DeliveryLogId, EventType};
//!
//! // Core types are available for use across the system
//! let account_id = AccountId::new();
//! let log_id = DeliveryLogId::new();
//! assert_eq!(EventType::SubmissionCreated.as_str(), "submission.created");
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// Re-export commonly used types
pub use ulid::Ulid;
pub use uuid::Uuid;

/// Standard result type for form-relay operations
pub type RelayResult<T> = Result<T, RelayError>;

// ============================================================================
// Domain Identifier Types
// ============================================================================

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a new random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Get the underlying UUID
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = s.parse::<Uuid>().map_err(|_| ParseError::InvalidFormat {
                    expected: "UUID format".to_string(),
                    actual: s.to_string(),
                })?;
                Ok(Self(uuid))
            }
        }
    };
}

uuid_id! {
    /// Unique identifier for a completed submission
    SubmissionId
}

uuid_id! {
    /// Unique identifier for a form
    FormId
}

uuid_id! {
    /// Unique identifier for the account that owns forms and destinations
    AccountId
}

uuid_id! {
    /// Unique identifier for a single form field
    FieldId
}

uuid_id! {
    /// Unique identifier for any delivery destination
    ///
    /// Shared across the three destination variants (provider integration,
    /// webhook, REST-hook subscription); the variant is carried separately in
    /// [`destination::DestinationRef`].
    DestinationId
}

/// Unique identifier for delivery log entries
///
/// Uses ULID for lexicographic sorting and global uniqueness, so log rows
/// order naturally by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryLogId(Ulid);

impl DeliveryLogId {
    /// Generate a new unique log ID
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for DeliveryLogId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DeliveryLogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DeliveryLogId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ulid = s.parse::<Ulid>().map_err(|_| ParseError::InvalidFormat {
            expected: "ULID format".to_string(),
            actual: s.to_string(),
        })?;
        Ok(Self(ulid))
    }
}

// ============================================================================
// Event Types
// ============================================================================

/// Events a destination can subscribe to
///
/// The orchestrator emits only `submission.created`; the other two exist for
/// REST-hook subscriptions and generic webhooks triggered by the form
/// lifecycle elsewhere in the product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "submission.created")]
    SubmissionCreated,
    #[serde(rename = "form.published")]
    FormPublished,
    #[serde(rename = "form.created")]
    FormCreated,
    /// Connectivity-test delivery; not subscribable
    #[serde(rename = "test")]
    Test,
}

impl EventType {
    /// Get wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SubmissionCreated => "submission.created",
            Self::FormPublished => "form.published",
            Self::FormCreated => "form.created",
            Self::Test => "test",
        }
    }

    /// All subscribable event types, in wire form
    pub fn all() -> &'static [&'static str] {
        &["submission.created", "form.published", "form.created"]
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submission.created" => Ok(Self::SubmissionCreated),
            "form.published" => Ok(Self::FormPublished),
            "form.created" => Ok(Self::FormCreated),
            _ => Err(ParseError::InvalidFormat {
                expected: EventType::all().join(", "),
                actual: s.to_string(),
            }),
        }
    }
}

// ============================================================================
// Time Types
// ============================================================================

/// UTC timestamp used throughout the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current moment
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Parse timestamp from RFC3339 string
    pub fn from_rfc3339(s: &str) -> Result<Self, ParseError> {
        let dt = DateTime::parse_from_rfc3339(s)
            .map_err(|_| ParseError::InvalidFormat {
                expected: "RFC3339 datetime".to_string(),
                actual: s.to_string(),
            })?
            .with_timezone(&Utc);
        Ok(Self(dt))
    }

    /// Wrap an existing UTC datetime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Convert to RFC3339 string
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }

    /// Calendar date portion, `YYYY-MM-DD`
    pub fn date_string(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Subtract duration from timestamp
    pub fn subtract_duration(&self, duration: Duration) -> Self {
        let chrono_duration = chrono::Duration::from_std(duration).unwrap_or_default();
        Self(self.0 - chrono_duration)
    }

    /// Get duration since another timestamp
    pub fn duration_since(&self, other: Self) -> Duration {
        let chrono_duration = self.0.signed_duration_since(other.0);
        chrono_duration.to_std().unwrap_or_default()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// High-level error categorization for alerting decisions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Temporary failures against an external dependency
    Transient,
    /// Permanent failures that won't succeed if repeated
    Permanent,
    /// Configuration errors (bad credentials, incomplete settings)
    Configuration,
}

/// Error type for input validation failures
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("Field '{field}' is required")]
    Required { field: String },

    #[error("Field '{field}' has invalid format: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Field '{field}' exceeds maximum length of {max_length}")]
    TooLong { field: String, max_length: usize },
}

/// Error type for string parsing failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid format: expected {expected}, got '{actual}'")]
    InvalidFormat { expected: String, actual: String },
}

/// Error type for destination and delivery-log store operations
///
/// The engine treats the relational store as an external collaborator; its
/// failures are classified here so callers can distinguish an unreachable
/// store from a rejected operation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {message}")]
    Unavailable { message: String },

    #[error("Store operation failed: {message}")]
    OperationFailed { message: String },
}

impl StoreError {
    /// Check if store error is transient
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable { .. } => true,
            Self::OperationFailed { .. } => false,
        }
    }
}

/// Top-level error type for form-relay operations
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("External service error: {service} - {message}")]
    ExternalService { service: String, message: String },
}

impl RelayError {
    /// Check if error is transient
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ExternalService { .. } => true,
            Self::Store(store_error) => store_error.is_transient(),
            Self::Validation(_) => false,
            Self::Parse(_) => false,
            Self::Configuration { .. } => false,
        }
    }

    /// Get error category for monitoring and alerting
    pub fn error_category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) => ErrorCategory::Permanent,
            Self::Parse(_) => ErrorCategory::Permanent,
            Self::Store(store_error) => {
                if store_error.is_transient() {
                    ErrorCategory::Transient
                } else {
                    ErrorCategory::Permanent
                }
            }
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::ExternalService { .. } => ErrorCategory::Transient,
        }
    }
}

// ============================================================================
// Module declarations
// ============================================================================

/// Submission event and outbound payload envelopes
pub mod submission;

/// Destination configuration: provider integrations, webhooks, REST hooks
pub mod destination;

/// Injected HTTP transport abstraction
pub mod transport;

/// Field normalization and identity heuristics
pub mod normalize;

/// Append-only delivery log and the failure-window policy
pub mod delivery_log;

/// Signed webhook delivery dispatcher
pub mod dispatch;

/// Provider adapters for the eight supported integrations
pub mod providers;

/// REST-hook subscription management
pub mod subscription;

/// Submission fan-out orchestrator
pub mod orchestrator;

/// In-memory store adapters for tests and development
pub mod adapters;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export key types for convenience
pub use adapters::{MemoryDeliveryLogStore, MemoryIntegrationStore, MemorySubscriptionStore, MemoryWebhookStore};
pub use delivery_log::{DeliveryLog, DeliveryLogStore, FailurePolicy};
pub use destination::{
    CredentialBundle, DestinationKind, DestinationRef, IntegrationSettings, IntegrationStore,
    ProviderIntegration, ProviderKind, RestHookSubscription, Secret, Webhook, WebhookStore,
};
pub use dispatch::{DeliveryOutcome, DeliveryTarget, DispatchConfig, DispatchStatus, Dispatcher};
pub use normalize::{AliasTable, NormalizeError, TargetType};
pub use orchestrator::{AggregateResult, Orchestrator, OrchestratorConfig, ProviderDispatchResult};
pub use providers::{AdapterRegistry, IdentityCheck, ProviderAdapter, ProviderError, PushReceipt, TargetContainer};
pub use submission::{FieldAnswer, FieldKind, SubmissionEvent};
pub use subscription::{SubscriptionCreated, SubscriptionError, SubscriptionManager, SubscriptionStore};
pub use transport::{HttpTransport, OutboundRequest, OutboundResponse, ReqwestTransport, TransportError};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
