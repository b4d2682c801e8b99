//! # Provider Adapters
//!
//! One adapter per third-party integration, all behind the uniform
//! [`ProviderAdapter`] contract: an identity check, a push of normalized
//! submission data, and read-only discovery of target containers for the
//! configuration UI.
//!
//! Adapters never let provider-specific failures escape as anything other
//! than a structured [`ProviderError`]; the orchestrator treats every
//! adapter call as "may fail, must not crash the batch". New providers are
//! added by implementing the contract, never by branching inside the
//! orchestrator.

use crate::destination::{CredentialBundle, ProviderIntegration, ProviderKind};
use crate::normalize::NormalizeError;
use crate::submission::SubmissionEvent;
use crate::transport::{HttpTransport, TransportError};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

mod airtable;
mod discord;
mod hubspot;
mod mailchimp;
mod notion;
mod sheets;
mod slack;
mod twilio;

pub use airtable::AirtableAdapter;
pub use discord::DiscordAdapter;
pub use hubspot::HubspotAdapter;
pub use mailchimp::MailchimpAdapter;
pub use notion::NotionAdapter;
pub use sheets::GoogleSheetsAdapter;
pub use slack::SlackAdapter;
pub use twilio::TwilioAdapter;

// ============================================================================
// Results
// ============================================================================

/// Result of a provider identity check
///
/// Always a structured value, never an error: invalid credentials are a
/// normal, reportable outcome of the configuration UI flow.
#[derive(Debug, Clone, Serialize)]
pub struct IdentityCheck {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IdentityCheck {
    /// Successful check with the provider-reported identity
    pub fn ok(identity: impl Into<String>) -> Self {
        Self {
            success: true,
            identity: Some(identity.into()),
            error: None,
        }
    }

    /// Failed check with the provider's error text preserved verbatim
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            identity: None,
            error: Some(error.into()),
        }
    }
}

/// Successful push receipt
#[derive(Debug, Clone)]
pub struct PushReceipt {
    /// Identifier of the record created or updated on the provider side
    pub record_id: Option<String>,
    /// Human-readable summary for the aggregate result
    pub detail: Option<String>,
}

impl PushReceipt {
    /// Receipt with a provider record id
    pub fn with_record(record_id: impl Into<String>) -> Self {
        Self {
            record_id: Some(record_id.into()),
            detail: None,
        }
    }

    /// Receipt carrying only a summary
    pub fn with_detail(detail: impl Into<String>) -> Self {
        Self {
            record_id: None,
            detail: Some(detail.into()),
        }
    }

    /// Attach a summary
    pub fn and_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// A target container discovered on the provider side: an audience, a
/// database, a base or table, a pipeline, a spreadsheet
#[derive(Debug, Clone, Serialize)]
pub struct TargetContainer {
    pub id: String,
    pub name: String,
    pub kind: String,
}

impl TargetContainer {
    /// Create new container entry
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: kind.into(),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Structured adapter failure
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// A destination-required identity field could not be resolved
    #[error("Missing identity field: {0}")]
    MissingIdentity(#[from] NormalizeError),

    /// Integration settings are incomplete for this provider
    #[error("{provider} configuration incomplete: {message}")]
    Configuration {
        provider: ProviderKind,
        message: String,
    },

    /// Wrong credential bundle shape for this provider
    #[error("{provider} requires {expected} credentials")]
    CredentialMismatch {
        provider: ProviderKind,
        expected: &'static str,
    },

    /// Destination-side validation rejected the payload; the provider's
    /// message is preserved verbatim
    #[error("{provider} rejected the request: {message}")]
    Rejected {
        provider: ProviderKind,
        status: Option<u16>,
        message: String,
    },

    /// The request never produced an HTTP status
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    /// The provider answered with a shape the adapter cannot interpret
    #[error("Unexpected {provider} response: {message}")]
    UnexpectedResponse {
        provider: ProviderKind,
        message: String,
    },

    /// The operation is not supported by this provider
    #[error("{provider} does not support {operation}")]
    Unsupported {
        provider: ProviderKind,
        operation: &'static str,
    },
}

impl ProviderError {
    /// Check if error is transient
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(transport_error) => transport_error.is_transient(),
            Self::Rejected { status, .. } => matches!(status, Some(s) if *s >= 500),
            Self::MissingIdentity(_) => false,
            Self::Configuration { .. } => false,
            Self::CredentialMismatch { .. } => false,
            Self::UnexpectedResponse { .. } => false,
            Self::Unsupported { .. } => false,
        }
    }
}

// ============================================================================
// Adapter Trait
// ============================================================================

/// Uniform capability contract implemented by every provider adapter
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// The provider this adapter talks to
    fn kind(&self) -> ProviderKind;

    /// Check the credentials and report the provider-side identity
    async fn test_identity(&self, credentials: &CredentialBundle) -> IdentityCheck;

    /// Push one normalized submission to the provider
    async fn push(
        &self,
        integration: &ProviderIntegration,
        event: &SubmissionEvent,
    ) -> Result<PushReceipt, ProviderError>;

    /// List target containers for the configuration UI
    ///
    /// `parent` scopes the listing where the provider nests containers
    /// (e.g. tables within a base).
    async fn discover(
        &self,
        credentials: &CredentialBundle,
        parent: Option<&str>,
    ) -> Result<Vec<TargetContainer>, ProviderError>;
}

// ============================================================================
// Registry
// ============================================================================

/// Lookup table from provider kind to adapter instance
///
/// All adapters share one injected transport; each receives only the
/// credential bundle for the call at hand.
pub struct AdapterRegistry {
    adapters: HashMap<ProviderKind, Arc<dyn ProviderAdapter>>,
}

impl AdapterRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Registry with all eight standard adapters
    pub fn standard(transport: Arc<dyn HttpTransport>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(MailchimpAdapter::new(transport.clone())));
        registry.register(Arc::new(NotionAdapter::new(transport.clone())));
        registry.register(Arc::new(DiscordAdapter::new(transport.clone())));
        registry.register(Arc::new(SlackAdapter::new(transport.clone())));
        registry.register(Arc::new(HubspotAdapter::new(transport.clone())));
        registry.register(Arc::new(AirtableAdapter::new(transport.clone())));
        registry.register(Arc::new(GoogleSheetsAdapter::new(transport.clone())));
        registry.register(Arc::new(TwilioAdapter::new(transport)));
        registry
    }

    /// Register (or replace) an adapter
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    /// Look up the adapter for a provider kind
    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&kind).cloned()
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Shared Helpers
// ============================================================================

/// Extract the provider's error message from a JSON error body, falling back
/// to the raw text
pub(crate) fn error_message(body: &serde_json::Value, raw: &str, keys: &[&str]) -> String {
    for key in keys {
        if let Some(message) = body.get(*key).and_then(|v| v.as_str()) {
            return message.to_string();
        }
    }
    // Some providers nest the message one level down, e.g. {"error": {"message": ...}}
    if let Some(message) = body
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|v| v.as_str())
    {
        return message.to_string();
    }
    raw.trim().to_string()
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
