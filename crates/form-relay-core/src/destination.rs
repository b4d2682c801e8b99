//! # Destinations
//!
//! Configuration records for everywhere a completed submission may be sent:
//! provider integrations, account-level webhooks, and REST-hook
//! subscriptions.
//!
//! Secrets are generated once at creation time, never logged, and only ever
//! used as HMAC keys. The [`Secret`] wrapper zeroizes on drop and redacts
//! itself from `Debug` output.

use crate::{AccountId, DestinationId, EventType, FormId, ParseError, ValidationError};
use async_trait::async_trait;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use zeroize::{Zeroize, ZeroizeOnDrop};

// ============================================================================
// Provider Kinds
// ============================================================================

/// The eight supported third-party provider integrations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderKind {
    Mailchimp,
    Notion,
    Discord,
    Slack,
    Hubspot,
    Airtable,
    GoogleSheets,
    Twilio,
}

impl ProviderKind {
    /// Get wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mailchimp => "MAILCHIMP",
            Self::Notion => "NOTION",
            Self::Discord => "DISCORD",
            Self::Slack => "SLACK",
            Self::Hubspot => "HUBSPOT",
            Self::Airtable => "AIRTABLE",
            Self::GoogleSheets => "GOOGLE_SHEETS",
            Self::Twilio => "TWILIO",
        }
    }

    /// All known provider kinds
    pub fn all() -> &'static [ProviderKind] {
        &[
            Self::Mailchimp,
            Self::Notion,
            Self::Discord,
            Self::Slack,
            Self::Hubspot,
            Self::Airtable,
            Self::GoogleSheets,
            Self::Twilio,
        ]
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MAILCHIMP" => Ok(Self::Mailchimp),
            "NOTION" => Ok(Self::Notion),
            "DISCORD" => Ok(Self::Discord),
            "SLACK" => Ok(Self::Slack),
            "HUBSPOT" => Ok(Self::Hubspot),
            "AIRTABLE" => Ok(Self::Airtable),
            "GOOGLE_SHEETS" => Ok(Self::GoogleSheets),
            "TWILIO" => Ok(Self::Twilio),
            _ => Err(ParseError::InvalidFormat {
                expected: "known provider type".to_string(),
                actual: s.to_string(),
            }),
        }
    }
}

// ============================================================================
// Secrets and Credentials
// ============================================================================

/// Secret material for signing and provider authentication
///
/// Never serialized, never printed. Comparison is available for store
/// implementations and tests; signing code accesses the bytes through
/// [`Secret::as_str`].
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Secret(String);

impl Secret {
    /// Wrap an existing secret value
    pub fn from_string(value: String) -> Self {
        Self(value)
    }

    /// Generate a fresh 32-byte random secret, hex-encoded
    pub fn generate() -> Self {
        let mut buf = [0u8; 32];
        rand::rng().fill_bytes(&mut buf);
        Self(hex::encode(buf))
    }

    /// Get the raw secret value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Secret").field(&"<REDACTED>").finish()
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(Self(String::deserialize(deserializer)?))
    }
}

/// Decrypted credential bundle handed to exactly one adapter call
///
/// Adapters receive only the bundle they need, never a handle to the full
/// credential store.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CredentialBundle {
    /// Plain API key (Mailchimp, Notion, Airtable)
    ApiKey { key: Secret },
    /// OAuth-style bearer token (HubSpot, Google Sheets)
    AccessToken { token: Secret },
    /// Incoming-webhook URL (Discord, Slack); the URL is the credential
    WebhookUrl { url: String },
    /// SMS gateway credentials (Twilio)
    #[serde(rename_all = "camelCase")]
    Sms {
        account_sid: String,
        auth_token: Secret,
        from_number: String,
    },
}

// ============================================================================
// Provider Integrations
// ============================================================================

/// Per-form settings controlling how a provider push is shaped
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IntegrationSettings {
    /// Field ID → destination field name
    pub field_mapping: HashMap<String, String>,
    /// Mailchimp audience
    pub list_id: Option<String>,
    /// Notion database
    pub database_id: Option<String>,
    /// Airtable base and table
    pub base_id: Option<String>,
    pub table_id: Option<String>,
    /// Airtable upsert key; absent means plain create
    pub unique_field: Option<String>,
    /// Google Sheets target
    pub spreadsheet_id: Option<String>,
    pub sheet_name: Option<String>,
    /// Twilio recipients
    pub recipients: Vec<String>,
    /// HubSpot: also create an associated deal
    pub create_deal: bool,
    /// Discord embed color
    pub embed_color: Option<u32>,
    /// Mailchimp tags
    pub tags: Vec<String>,
    /// Mailchimp status for newly created members
    pub status_if_new: Option<String>,
}

/// A provider integration linked to a form
#[derive(Debug, Clone)]
pub struct ProviderIntegration {
    pub id: DestinationId,
    pub account: AccountId,
    pub form: FormId,
    pub provider: ProviderKind,
    pub credentials: CredentialBundle,
    pub settings: IntegrationSettings,
    pub active: bool,
}

impl ProviderIntegration {
    /// Reference for delivery-log rows and aggregate results
    pub fn destination_ref(&self) -> DestinationRef {
        DestinationRef {
            kind: DestinationKind::Provider,
            id: self.id,
        }
    }
}

// ============================================================================
// Webhooks
// ============================================================================

/// Account-level webhook destination
#[derive(Debug, Clone)]
pub struct Webhook {
    pub id: DestinationId,
    pub account: AccountId,
    pub name: String,
    pub url: String,
    pub secret: Secret,
    pub events: HashSet<EventType>,
    pub headers: HashMap<String, String>,
    pub active: bool,
}

impl Webhook {
    /// Create a webhook with a freshly generated secret
    pub fn new(
        account: AccountId,
        name: impl Into<String>,
        url: impl Into<String>,
        events: HashSet<EventType>,
        headers: HashMap<String, String>,
    ) -> Result<Self, ValidationError> {
        let url = url.into();
        validate_target_url(&url)?;

        Ok(Self {
            id: DestinationId::new(),
            account,
            name: name.into(),
            url,
            secret: Secret::generate(),
            events,
            headers,
            active: true,
        })
    }

    /// Replace the signing secret; previous signatures stop verifying
    pub fn regenerate_secret(&mut self) -> &Secret {
        self.secret = Secret::generate();
        &self.secret
    }

    /// Check subscription to an event type
    pub fn subscribes_to(&self, event: EventType) -> bool {
        self.events.contains(&event)
    }

    /// Reference for delivery-log rows and aggregate results
    pub fn destination_ref(&self) -> DestinationRef {
        DestinationRef {
            kind: DestinationKind::Webhook,
            id: self.id,
        }
    }
}

// ============================================================================
// REST-Hook Subscriptions
// ============================================================================

/// A subscription registered by an external automation platform
#[derive(Debug, Clone)]
pub struct RestHookSubscription {
    pub id: DestinationId,
    pub account: AccountId,
    pub event: EventType,
    pub target_url: String,
    pub secret: Secret,
    pub active: bool,
    /// Correlation id assigned by the subscribing platform, if any
    pub correlation: Option<String>,
}

impl RestHookSubscription {
    /// Create a subscription with a freshly generated secret
    pub fn new(
        account: AccountId,
        event: EventType,
        target_url: impl Into<String>,
        correlation: Option<String>,
    ) -> Result<Self, ValidationError> {
        let target_url = target_url.into();
        validate_target_url(&target_url)?;

        Ok(Self {
            id: DestinationId::new(),
            account,
            event,
            target_url,
            secret: Secret::generate(),
            active: true,
            correlation,
        })
    }

    /// Reference for delivery-log rows and aggregate results
    pub fn destination_ref(&self) -> DestinationRef {
        DestinationRef {
            kind: DestinationKind::RestHook,
            id: self.id,
        }
    }
}

/// Validate that a destination URL is an absolute http(s) URL
fn validate_target_url(raw: &str) -> Result<(), ValidationError> {
    let parsed = url::Url::parse(raw).map_err(|e| ValidationError::InvalidFormat {
        field: "url".to_string(),
        message: e.to_string(),
    })?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ValidationError::InvalidFormat {
            field: "url".to_string(),
            message: "scheme must be http or https".to_string(),
        });
    }

    Ok(())
}

// ============================================================================
// Destination References
// ============================================================================

/// Which variant a [`DestinationRef`] points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationKind {
    Provider,
    Webhook,
    RestHook,
}

impl DestinationKind {
    /// Get wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provider => "provider",
            Self::Webhook => "webhook",
            Self::RestHook => "rest_hook",
        }
    }
}

/// Typed reference to a destination, used by delivery-log rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DestinationRef {
    pub kind: DestinationKind,
    pub id: DestinationId,
}

impl fmt::Display for DestinationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind.as_str(), self.id)
    }
}

// ============================================================================
// Store Traits
// ============================================================================

/// Read/update access to provider integrations
///
/// Implemented by the relational layer; the engine only ever reads
/// configuration and flips the active flag.
#[async_trait]
pub trait IntegrationStore: Send + Sync {
    /// Active integrations linked to a form
    async fn active_for_form(
        &self,
        form: FormId,
    ) -> Result<Vec<ProviderIntegration>, crate::StoreError>;

    /// Flip the active flag (automatic deactivation, explicit reactivation)
    async fn set_active(&self, id: DestinationId, active: bool) -> Result<(), crate::StoreError>;
}

/// Read/update access to account webhooks
#[async_trait]
pub trait WebhookStore: Send + Sync {
    async fn insert(&self, webhook: Webhook) -> Result<(), crate::StoreError>;

    async fn get(
        &self,
        account: AccountId,
        id: DestinationId,
    ) -> Result<Option<Webhook>, crate::StoreError>;

    async fn list_for_account(&self, account: AccountId) -> Result<Vec<Webhook>, crate::StoreError>;

    /// Active webhooks for an account subscribed to an event type
    async fn active_for_event(
        &self,
        account: AccountId,
        event: EventType,
    ) -> Result<Vec<Webhook>, crate::StoreError>;

    async fn set_active(&self, id: DestinationId, active: bool) -> Result<(), crate::StoreError>;

    /// Persist a regenerated secret
    async fn update_secret(&self, id: DestinationId, secret: Secret)
        -> Result<(), crate::StoreError>;
}

#[cfg(test)]
#[path = "destination_tests.rs"]
mod tests;
