//! CRM contact/deal upsert adapter for HubSpot.
//!
//! Contacts are searched by email before creation so repeated submissions
//! update the same record. Common identity fields (first/last name, phone,
//! company) are auto-mapped by alias heuristics even without explicit
//! configuration, and a deal can be created and associated with the contact.

use super::{error_message, IdentityCheck, ProviderAdapter, ProviderError, PushReceipt, TargetContainer};
use crate::destination::{CredentialBundle, ProviderIntegration, ProviderKind, Secret};
use crate::normalize::{self, AliasTable, NormalizeError};
use crate::submission::SubmissionEvent;
use crate::transport::{HttpTransport, OutboundRequest};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

const BASE_URL: &str = "https://api.hubapi.com";

/// Upserts submissions as HubSpot contacts, optionally with deals
pub struct HubspotAdapter {
    transport: Arc<dyn HttpTransport>,
}

impl HubspotAdapter {
    /// Create new adapter
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    fn access_token<'a>(
        &self,
        credentials: &'a CredentialBundle,
    ) -> Result<&'a Secret, ProviderError> {
        match credentials {
            CredentialBundle::AccessToken { token } => Ok(token),
            _ => Err(ProviderError::CredentialMismatch {
                provider: ProviderKind::Hubspot,
                expected: "access token",
            }),
        }
    }

    /// Split mapped answers into contact and deal property maps
    ///
    /// Mapping targets prefixed `contact.` / `deal.` route explicitly;
    /// everything else defaults to a contact property. Alias heuristics then
    /// fill common identity properties that no mapping claimed.
    fn build_properties(
        integration: &ProviderIntegration,
        event: &SubmissionEvent,
    ) -> (Map<String, Value>, Map<String, Value>, Option<String>) {
        let mapping = &integration.settings.field_mapping;
        let mut contact = Map::new();
        let mut deal = Map::new();
        let mut email: Option<String> = None;

        for answer in &event.answers {
            if answer.is_empty() {
                continue;
            }
            let Some(target) = mapping.get(&answer.field_id.to_string()) else {
                continue;
            };
            if target.is_empty() {
                continue;
            }
            let value = json!(normalize::value_to_string(&answer.value));

            if target == "email" {
                email = Some(normalize::value_to_string(&answer.value));
                contact.insert("email".to_string(), value);
            } else if let Some(prop) = target.strip_prefix("contact.") {
                contact.insert(prop.to_string(), value);
            } else if let Some(prop) = target.strip_prefix("deal.") {
                deal.insert(prop.to_string(), value);
            } else {
                contact.insert(target.clone(), value);
            }
        }

        for (canonical, value) in AliasTable::standard().resolve(&event.answers) {
            if !contact.contains_key(canonical) {
                contact.insert(
                    canonical.to_string(),
                    json!(normalize::value_to_string(&value)),
                );
            }
        }

        if email.is_none() {
            if let Some(detected) = normalize::detect_email(&event.answers) {
                contact.insert("email".to_string(), json!(detected));
                email = Some(detected);
            }
        }

        (contact, deal, email)
    }

    async fn find_contact_by_email(
        &self,
        token: &Secret,
        email: &str,
    ) -> Result<Option<String>, ProviderError> {
        let payload = json!({
            "filterGroups": [{
                "filters": [{
                    "propertyName": "email",
                    "operator": "EQ",
                    "value": email,
                }],
            }],
        });
        let request = OutboundRequest::post(format!("{}/crm/v3/objects/contacts/search", BASE_URL))
            .with_bearer(token.as_str())
            .with_json(&payload)?;

        let response = self.transport.execute(request).await?;
        if !response.is_success() {
            let body = response.json_value();
            return Err(ProviderError::Rejected {
                provider: ProviderKind::Hubspot,
                status: Some(response.status),
                message: error_message(&body, &response.text(), &["message"]),
            });
        }

        let body = response.json_value();
        Ok(body
            .get("results")
            .and_then(|v| v.as_array())
            .and_then(|results| results.first())
            .and_then(|contact| contact.get("id"))
            .and_then(|id| id.as_str())
            .map(str::to_string))
    }

    async fn create_contact(
        &self,
        token: &Secret,
        properties: &Map<String, Value>,
    ) -> Result<String, ProviderError> {
        let payload = json!({ "properties": properties });
        let request = OutboundRequest::post(format!("{}/crm/v3/objects/contacts", BASE_URL))
            .with_bearer(token.as_str())
            .with_json(&payload)?;

        let response = self.transport.execute(request).await?;
        if response.is_success() {
            let body = response.json_value();
            return body
                .get("id")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .ok_or_else(|| ProviderError::UnexpectedResponse {
                    provider: ProviderKind::Hubspot,
                    message: "contact response missing 'id'".to_string(),
                });
        }

        let body = response.json_value();
        let message = error_message(&body, &response.text(), &["message"]);

        // A 409 names the existing record; fall back to updating it.
        if response.status == 409 {
            if let Some(existing_id) = message
                .split("ID: ")
                .nth(1)
                .map(|rest| rest.trim_end_matches(|c: char| !c.is_ascii_digit()))
                .filter(|id| !id.is_empty())
            {
                let existing_id = existing_id.to_string();
                self.update_contact(token, &existing_id, properties).await?;
                return Ok(existing_id);
            }
        }

        Err(ProviderError::Rejected {
            provider: ProviderKind::Hubspot,
            status: Some(response.status),
            message,
        })
    }

    async fn update_contact(
        &self,
        token: &Secret,
        contact_id: &str,
        properties: &Map<String, Value>,
    ) -> Result<(), ProviderError> {
        let payload = json!({ "properties": properties });
        let request = OutboundRequest::patch(format!(
            "{}/crm/v3/objects/contacts/{}",
            BASE_URL, contact_id
        ))
        .with_bearer(token.as_str())
        .with_json(&payload)?;

        let response = self.transport.execute(request).await?;
        if response.is_success() {
            Ok(())
        } else {
            let body = response.json_value();
            Err(ProviderError::Rejected {
                provider: ProviderKind::Hubspot,
                status: Some(response.status),
                message: error_message(&body, &response.text(), &["message"]),
            })
        }
    }

    async fn create_deal(
        &self,
        token: &Secret,
        properties: &Map<String, Value>,
        contact_id: &str,
    ) -> Result<Option<String>, ProviderError> {
        let payload = json!({
            "properties": properties,
            "associations": [{
                "to": { "id": contact_id },
                "types": [{ "associationCategory": "HUBSPOT_DEFINED", "associationTypeId": 3 }],
            }],
        });
        let request = OutboundRequest::post(format!("{}/crm/v3/objects/deals", BASE_URL))
            .with_bearer(token.as_str())
            .with_json(&payload)?;

        let response = self.transport.execute(request).await?;
        if response.is_success() {
            let body = response.json_value();
            Ok(body
                .get("id")
                .and_then(|v| v.as_str())
                .map(str::to_string))
        } else {
            let body = response.json_value();
            Err(ProviderError::Rejected {
                provider: ProviderKind::Hubspot,
                status: Some(response.status),
                message: error_message(&body, &response.text(), &["message"]),
            })
        }
    }
}

#[async_trait]
impl ProviderAdapter for HubspotAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Hubspot
    }

    async fn test_identity(&self, credentials: &CredentialBundle) -> IdentityCheck {
        let token = match self.access_token(credentials) {
            Ok(token) => token,
            Err(e) => return IdentityCheck::failed(e.to_string()),
        };

        let request = OutboundRequest::get(format!("{}/account-info/v3/details", BASE_URL))
            .with_bearer(token.as_str());

        match self.transport.execute(request).await {
            Ok(response) if response.is_success() => {
                let body = response.json_value();
                let portal = body
                    .get("portalId")
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                IdentityCheck::ok(format!("portal {}", portal))
            }
            Ok(response) => {
                let body = response.json_value();
                IdentityCheck::failed(error_message(&body, &response.text(), &["message"]))
            }
            Err(e) => IdentityCheck::failed(e.to_string()),
        }
    }

    async fn push(
        &self,
        integration: &ProviderIntegration,
        event: &SubmissionEvent,
    ) -> Result<PushReceipt, ProviderError> {
        let token = self.access_token(&integration.credentials)?;
        let (mut contact, mut deal, email) = Self::build_properties(integration, event);

        let email = email.ok_or(NormalizeError::MissingIdentity {
            field: "email".to_string(),
        })?;

        contact.insert("hs_lead_status".to_string(), json!("NEW"));
        contact.insert(
            "recent_conversion_event_name".to_string(),
            json!(event.form_title),
        );

        let contact_id = match self.find_contact_by_email(token, &email).await? {
            Some(existing_id) => {
                self.update_contact(token, &existing_id, &contact).await?;
                existing_id
            }
            None => self.create_contact(token, &contact).await?,
        };

        let mut deal_id = None;
        if !deal.is_empty() || integration.settings.create_deal {
            if !deal.contains_key("dealname") {
                let lead = contact
                    .get("firstname")
                    .and_then(|v| v.as_str())
                    .unwrap_or(&email);
                deal.insert(
                    "dealname".to_string(),
                    json!(format!("{} - {}", lead, event.form_title)),
                );
            }
            deal.entry("pipeline".to_string())
                .or_insert_with(|| json!("default"));
            deal.entry("dealstage".to_string())
                .or_insert_with(|| json!("appointmentscheduled"));

            deal_id = self.create_deal(token, &deal, &contact_id).await?;
        }

        let detail = match &deal_id {
            Some(deal_id) => format!("contact {} upserted, deal {} created", email, deal_id),
            None => format!("contact {} upserted", email),
        };
        Ok(PushReceipt::with_record(contact_id).and_detail(detail))
    }

    async fn discover(
        &self,
        credentials: &CredentialBundle,
        _parent: Option<&str>,
    ) -> Result<Vec<TargetContainer>, ProviderError> {
        let token = self.access_token(credentials)?;
        let request = OutboundRequest::get(format!("{}/crm/v3/pipelines/deals", BASE_URL))
            .with_bearer(token.as_str());

        let response = self.transport.execute(request).await?;
        if !response.is_success() {
            let body = response.json_value();
            return Err(ProviderError::Rejected {
                provider: ProviderKind::Hubspot,
                status: Some(response.status),
                message: error_message(&body, &response.text(), &["message"]),
            });
        }

        let body = response.json_value();
        let results = body
            .get("results")
            .and_then(|v| v.as_array())
            .ok_or_else(|| ProviderError::UnexpectedResponse {
                provider: ProviderKind::Hubspot,
                message: "missing 'results' array".to_string(),
            })?;

        Ok(results
            .iter()
            .filter_map(|pipeline| {
                let id = pipeline.get("id")?.as_str()?;
                let label = pipeline.get("label")?.as_str()?;
                Some(TargetContainer::new(id, label, "pipeline"))
            })
            .collect())
    }
}

#[cfg(test)]
#[path = "hubspot_tests.rs"]
mod tests;
