//! Contact-list sync adapter for Mailchimp audiences.
//!
//! Pushes are upserts keyed on the MD5 hash of the lowercased subscriber
//! email, so resubmissions update the existing member instead of failing.

use super::{error_message, IdentityCheck, ProviderAdapter, ProviderError, PushReceipt, TargetContainer};
use crate::destination::{CredentialBundle, ProviderIntegration, ProviderKind, Secret};
use crate::normalize::{self, AliasTable, NormalizeError};
use crate::submission::SubmissionEvent;
use crate::transport::{HttpTransport, OutboundRequest};
use async_trait::async_trait;
use md5::{Digest, Md5};
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Syncs submissions into a Mailchimp audience
pub struct MailchimpAdapter {
    transport: Arc<dyn HttpTransport>,
}

impl MailchimpAdapter {
    /// Create new adapter
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    fn api_key<'a>(&self, credentials: &'a CredentialBundle) -> Result<&'a Secret, ProviderError> {
        match credentials {
            CredentialBundle::ApiKey { key } => Ok(key),
            _ => Err(ProviderError::CredentialMismatch {
                provider: ProviderKind::Mailchimp,
                expected: "API key",
            }),
        }
    }

    /// Base URL for the data center encoded in the API key suffix
    fn base_url(key: &Secret) -> String {
        let dc = key.as_str().split('-').nth(1).unwrap_or("us1");
        format!("https://{}.api.mailchimp.com/3.0", dc)
    }

    /// MD5 of the lowercased email, as Mailchimp's member key requires
    fn subscriber_hash(email: &str) -> String {
        hex::encode(Md5::digest(email.to_lowercase().as_bytes()))
    }

    /// Merge-field payload from mapped answers plus alias heuristics
    fn merge_fields(integration: &ProviderIntegration, event: &SubmissionEvent) -> Map<String, Value> {
        let mut fields = Map::new();
        let mapping = &integration.settings.field_mapping;

        // Heuristic identity fields fill in wherever no mapping claims them.
        let aliases = AliasTable::standard().resolve(&event.answers);
        for (canonical, tag) in [
            ("firstname", "FNAME"),
            ("lastname", "LNAME"),
            ("phone", "PHONE"),
            ("company", "COMPANY"),
        ] {
            if let Some(value) = aliases.get(canonical) {
                fields.insert(tag.to_string(), json!(normalize::value_to_string(value)));
            }
        }

        for answer in &event.answers {
            if answer.is_empty() {
                continue;
            }
            let Some(target) = mapping.get(&answer.field_id.to_string()) else {
                continue;
            };
            let value = json!(normalize::value_to_string(&answer.value));
            match target.as_str() {
                "" | "email" => {}
                "firstName" => {
                    fields.insert("FNAME".to_string(), value);
                }
                "lastName" => {
                    fields.insert("LNAME".to_string(), value);
                }
                "phone" => {
                    fields.insert("PHONE".to_string(), value);
                }
                "company" => {
                    fields.insert("COMPANY".to_string(), value);
                }
                tag => {
                    fields.insert(tag.to_string(), value);
                }
            }
        }

        fields
    }
}

#[async_trait]
impl ProviderAdapter for MailchimpAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Mailchimp
    }

    async fn test_identity(&self, credentials: &CredentialBundle) -> IdentityCheck {
        let key = match self.api_key(credentials) {
            Ok(key) => key,
            Err(e) => return IdentityCheck::failed(e.to_string()),
        };

        let request = OutboundRequest::get(format!("{}/ping", Self::base_url(key)))
            .with_bearer(key.as_str());

        match self.transport.execute(request).await {
            Ok(response) if response.is_success() => {
                let body = response.json_value();
                let health = body
                    .get("health_status")
                    .and_then(|v| v.as_str())
                    .unwrap_or("ok");
                IdentityCheck::ok(health)
            }
            Ok(response) => {
                let body = response.json_value();
                IdentityCheck::failed(error_message(&body, &response.text(), &["detail", "title"]))
            }
            Err(e) => IdentityCheck::failed(e.to_string()),
        }
    }

    async fn push(
        &self,
        integration: &ProviderIntegration,
        event: &SubmissionEvent,
    ) -> Result<PushReceipt, ProviderError> {
        let key = self.api_key(&integration.credentials)?;
        let list_id = integration.settings.list_id.as_deref().ok_or_else(|| {
            ProviderError::Configuration {
                provider: ProviderKind::Mailchimp,
                message: "no audience configured".to_string(),
            }
        })?;

        let email = normalize::resolve_email(&event.answers, &integration.settings.field_mapping)
            .ok_or(NormalizeError::MissingIdentity {
                field: "email".to_string(),
            })?;

        let mut payload = json!({
            "email_address": email,
            "status_if_new": integration
                .settings
                .status_if_new
                .as_deref()
                .unwrap_or("subscribed"),
            "merge_fields": Value::Object(Self::merge_fields(integration, event)),
        });
        if !integration.settings.tags.is_empty() {
            payload["tags"] = json!(integration.settings.tags);
        }

        let url = format!(
            "{}/lists/{}/members/{}",
            Self::base_url(key),
            list_id,
            Self::subscriber_hash(&email)
        );
        let request = OutboundRequest::put(url)
            .with_bearer(key.as_str())
            .with_json(&payload)?;

        let response = self.transport.execute(request).await?;
        if response.is_success() {
            let body = response.json_value();
            let member_id = body.get("id").and_then(|v| v.as_str()).unwrap_or_default();
            let status = body
                .get("status")
                .and_then(|v| v.as_str())
                .unwrap_or("subscribed");
            Ok(PushReceipt::with_record(member_id)
                .and_detail(format!("{} ({})", email, status)))
        } else {
            let body = response.json_value();
            Err(ProviderError::Rejected {
                provider: ProviderKind::Mailchimp,
                status: Some(response.status),
                message: error_message(&body, &response.text(), &["detail", "title"]),
            })
        }
    }

    async fn discover(
        &self,
        credentials: &CredentialBundle,
        _parent: Option<&str>,
    ) -> Result<Vec<TargetContainer>, ProviderError> {
        let key = self.api_key(credentials)?;
        let request = OutboundRequest::get(format!("{}/lists?count=100", Self::base_url(key)))
            .with_bearer(key.as_str());

        let response = self.transport.execute(request).await?;
        if !response.is_success() {
            let body = response.json_value();
            return Err(ProviderError::Rejected {
                provider: ProviderKind::Mailchimp,
                status: Some(response.status),
                message: error_message(&body, &response.text(), &["detail", "title"]),
            });
        }

        let body = response.json_value();
        let lists = body
            .get("lists")
            .and_then(|v| v.as_array())
            .ok_or_else(|| ProviderError::UnexpectedResponse {
                provider: ProviderKind::Mailchimp,
                message: "missing 'lists' array".to_string(),
            })?;

        Ok(lists
            .iter()
            .filter_map(|list| {
                let id = list.get("id")?.as_str()?;
                let name = list.get("name")?.as_str()?;
                Some(TargetContainer::new(id, name, "audience"))
            })
            .collect())
    }
}

#[cfg(test)]
#[path = "mailchimp_tests.rs"]
mod tests;
