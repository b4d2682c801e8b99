//! Document-database row adapter for Notion.
//!
//! Every push fetches the database schema first so mapped values can be
//! coerced to the property types Notion expects, then creates one page per
//! submission.

use super::{error_message, IdentityCheck, ProviderAdapter, ProviderError, PushReceipt, TargetContainer};
use crate::destination::{CredentialBundle, ProviderIntegration, ProviderKind, Secret};
use crate::normalize::{self, TargetType};
use crate::submission::SubmissionEvent;
use crate::transport::{HttpTransport, OutboundRequest};
use crate::Timestamp;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

const BASE_URL: &str = "https://api.notion.com/v1";
const NOTION_VERSION: &str = "2022-06-28";

/// Creates one Notion database row per submission
pub struct NotionAdapter {
    transport: Arc<dyn HttpTransport>,
}

impl NotionAdapter {
    /// Create new adapter
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    fn api_key<'a>(&self, credentials: &'a CredentialBundle) -> Result<&'a Secret, ProviderError> {
        match credentials {
            CredentialBundle::ApiKey { key } => Ok(key),
            _ => Err(ProviderError::CredentialMismatch {
                provider: ProviderKind::Notion,
                expected: "API key",
            }),
        }
    }

    fn request(key: &Secret, request: OutboundRequest) -> OutboundRequest {
        request
            .with_bearer(key.as_str())
            .with_header("Notion-Version", NOTION_VERSION)
    }

    /// Fetch the database's property name → type map
    async fn database_schema(
        &self,
        key: &Secret,
        database_id: &str,
    ) -> Result<HashMap<String, String>, ProviderError> {
        let request = Self::request(
            key,
            OutboundRequest::get(format!("{}/databases/{}", BASE_URL, database_id)),
        );

        let response = self.transport.execute(request).await?;
        if !response.is_success() {
            let body = response.json_value();
            return Err(ProviderError::Rejected {
                provider: ProviderKind::Notion,
                status: Some(response.status),
                message: error_message(&body, &response.text(), &["message"]),
            });
        }

        let body = response.json_value();
        let properties = body
            .get("properties")
            .and_then(|v| v.as_object())
            .ok_or_else(|| ProviderError::UnexpectedResponse {
                provider: ProviderKind::Notion,
                message: "missing 'properties' object".to_string(),
            })?;

        Ok(properties
            .iter()
            .filter_map(|(name, prop)| {
                let prop_type = prop.get("type")?.as_str()?;
                Some((name.clone(), prop_type.to_string()))
            })
            .collect())
    }

    /// Convert one value into Notion's property envelope for the given type
    ///
    /// Unknown property types fall back to rich text; unrepresentable values
    /// return `None` and the property is dropped.
    fn format_property(prop_type: &str, value: &Value) -> Option<Value> {
        match prop_type {
            "title" => Some(json!({
                "title": [{ "text": { "content": normalize::value_to_string(value) } }]
            })),
            "number" => Some(json!({ "number": normalize::parse_number(value) })),
            "select" => Some(json!({ "select": { "name": normalize::value_to_string(value) } })),
            "multi_select" => {
                let items = match value {
                    Value::Array(items) => items.iter().map(normalize::value_to_string).collect(),
                    other => vec![normalize::value_to_string(other)],
                };
                let options: Vec<Value> = items.into_iter().map(|v| json!({ "name": v })).collect();
                Some(json!({ "multi_select": options }))
            }
            "date" => {
                let coerced = normalize::coerce(TargetType::Date, value)?;
                Some(json!({ "date": { "start": coerced } }))
            }
            "checkbox" => Some(json!({ "checkbox": normalize::truthy(value) })),
            "email" => Some(json!({ "email": normalize::value_to_string(value) })),
            "phone_number" => Some(json!({ "phone_number": normalize::value_to_string(value) })),
            "url" => Some(json!({ "url": normalize::value_to_string(value) })),
            _ => Some(json!({
                "rich_text": [{ "text": { "content": normalize::value_to_string(value) } }]
            })),
        }
    }
}

#[async_trait]
impl ProviderAdapter for NotionAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Notion
    }

    async fn test_identity(&self, credentials: &CredentialBundle) -> IdentityCheck {
        let key = match self.api_key(credentials) {
            Ok(key) => key,
            Err(e) => return IdentityCheck::failed(e.to_string()),
        };

        let request = Self::request(key, OutboundRequest::get(format!("{}/users/me", BASE_URL)));

        match self.transport.execute(request).await {
            Ok(response) if response.is_success() => {
                let body = response.json_value();
                let identity = body
                    .get("name")
                    .and_then(|v| v.as_str())
                    .or_else(|| body.get("id").and_then(|v| v.as_str()))
                    .unwrap_or("unknown")
                    .to_string();
                IdentityCheck::ok(identity)
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
        let key = self.api_key(&integration.credentials)?;
        let database_id = integration.settings.database_id.as_deref().ok_or_else(|| {
            ProviderError::Configuration {
                provider: ProviderKind::Notion,
                message: "no database configured".to_string(),
            }
        })?;

        let schema = self.database_schema(key, database_id).await?;
        let mapping = &integration.settings.field_mapping;
        let mut properties = Map::new();

        for answer in &event.answers {
            if answer.is_empty() {
                continue;
            }
            let Some(target) = mapping.get(&answer.field_id.to_string()) else {
                continue;
            };
            let Some(prop_type) = schema.get(target) else {
                continue;
            };
            if let Some(formatted) = Self::format_property(prop_type, &answer.value) {
                properties.insert(target.clone(), formatted);
            }
        }

        // Stamp the first schema date property with a submission-timestamp name.
        for candidate in ["Submitted", "Date", "Created", "Timestamp"] {
            if schema.get(candidate).map(String::as_str) == Some("date") {
                properties.insert(
                    candidate.to_string(),
                    json!({ "date": { "start": Timestamp::now().to_rfc3339() } }),
                );
                break;
            }
        }

        let payload = json!({
            "parent": { "database_id": database_id },
            "properties": Value::Object(properties),
        });
        let request = Self::request(key, OutboundRequest::post(format!("{}/pages", BASE_URL)))
            .with_json(&payload)?;

        let response = self.transport.execute(request).await?;
        if response.is_success() {
            let body = response.json_value();
            let page_id = body.get("id").and_then(|v| v.as_str()).unwrap_or_default();
            let url = body.get("url").and_then(|v| v.as_str()).unwrap_or_default();
            Ok(PushReceipt::with_record(page_id).and_detail(url))
        } else {
            let body = response.json_value();
            Err(ProviderError::Rejected {
                provider: ProviderKind::Notion,
                status: Some(response.status),
                message: error_message(&body, &response.text(), &["message"]),
            })
        }
    }

    async fn discover(
        &self,
        credentials: &CredentialBundle,
        _parent: Option<&str>,
    ) -> Result<Vec<TargetContainer>, ProviderError> {
        let key = self.api_key(credentials)?;
        let payload = json!({
            "filter": { "property": "object", "value": "database" },
            "sort": { "direction": "descending", "timestamp": "last_edited_time" },
        });
        let request = Self::request(key, OutboundRequest::post(format!("{}/search", BASE_URL)))
            .with_json(&payload)?;

        let response = self.transport.execute(request).await?;
        if !response.is_success() {
            let body = response.json_value();
            return Err(ProviderError::Rejected {
                provider: ProviderKind::Notion,
                status: Some(response.status),
                message: error_message(&body, &response.text(), &["message"]),
            });
        }

        let body = response.json_value();
        let results = body
            .get("results")
            .and_then(|v| v.as_array())
            .ok_or_else(|| ProviderError::UnexpectedResponse {
                provider: ProviderKind::Notion,
                message: "missing 'results' array".to_string(),
            })?;

        Ok(results
            .iter()
            .filter_map(|db| {
                let id = db.get("id")?.as_str()?;
                let title = db
                    .get("title")
                    .and_then(|t| t.as_array())
                    .and_then(|t| t.first())
                    .and_then(|t| t.get("plain_text"))
                    .and_then(|t| t.as_str())
                    .unwrap_or("Untitled");
                Some(TargetContainer::new(id, title, "database"))
            })
            .collect())
    }
}
