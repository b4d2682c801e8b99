//! Table-row sync adapter for Airtable bases.
//!
//! Values are coerced against the live table schema. Batch creation is
//! chunked to Airtable's 10-records-per-request limit, and an optional
//! unique field turns pushes into find-or-update upserts.

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

const BASE_URL: &str = "https://api.airtable.com/v0";

/// Airtable's hard cap on records per create request
const MAX_RECORDS_PER_REQUEST: usize = 10;

/// Syncs submissions into Airtable table rows
pub struct AirtableAdapter {
    transport: Arc<dyn HttpTransport>,
}

impl AirtableAdapter {
    /// Create new adapter
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    fn api_key<'a>(&self, credentials: &'a CredentialBundle) -> Result<&'a Secret, ProviderError> {
        match credentials {
            CredentialBundle::ApiKey { key } => Ok(key),
            _ => Err(ProviderError::CredentialMismatch {
                provider: ProviderKind::Airtable,
                expected: "API key",
            }),
        }
    }

    fn table_settings(
        integration: &ProviderIntegration,
    ) -> Result<(&str, &str), ProviderError> {
        let base_id = integration.settings.base_id.as_deref().ok_or_else(|| {
            ProviderError::Configuration {
                provider: ProviderKind::Airtable,
                message: "no base configured".to_string(),
            }
        })?;
        let table_id = integration.settings.table_id.as_deref().ok_or_else(|| {
            ProviderError::Configuration {
                provider: ProviderKind::Airtable,
                message: "no table configured".to_string(),
            }
        })?;
        Ok((base_id, table_id))
    }

    /// Map an Airtable field type onto the engine's coercion target
    fn target_type(airtable_type: &str) -> TargetType {
        match airtable_type {
            "email" => TargetType::Email,
            "url" => TargetType::Url,
            "phoneNumber" => TargetType::Phone,
            "number" | "currency" | "percent" => TargetType::Number,
            "checkbox" => TargetType::Boolean,
            "singleSelect" => TargetType::Select,
            "multipleSelects" => TargetType::MultiSelect,
            "date" => TargetType::Date,
            "dateTime" => TargetType::DateTime,
            "rating" => TargetType::Rating,
            "multipleAttachments" => TargetType::Attachment,
            _ => TargetType::Text,
        }
    }

    /// Fetch the table's field name → type map
    ///
    /// Schema access needs broader token scopes than record writes, so a
    /// failure here degrades to no coercion instead of failing the push.
    async fn table_schema(
        &self,
        key: &Secret,
        base_id: &str,
        table_id: &str,
    ) -> Option<HashMap<String, TargetType>> {
        let request = OutboundRequest::get(format!(
            "https://api.airtable.com/v0/meta/bases/{}/tables",
            base_id
        ))
        .with_bearer(key.as_str());

        let response = self.transport.execute(request).await.ok()?;
        if !response.is_success() {
            return None;
        }

        let body = response.json_value();
        let tables = body.get("tables")?.as_array()?;
        let table = tables.iter().find(|t| {
            t.get("id").and_then(|v| v.as_str()) == Some(table_id)
                || t.get("name").and_then(|v| v.as_str()) == Some(table_id)
        })?;

        let fields = table.get("fields")?.as_array()?;
        Some(
            fields
                .iter()
                .filter_map(|field| {
                    let name = field.get("name")?.as_str()?;
                    let field_type = field.get("type")?.as_str()?;
                    Some((name.to_string(), Self::target_type(field_type)))
                })
                .collect(),
        )
    }

    /// Build the record fields for one submission
    fn build_fields(
        integration: &ProviderIntegration,
        event: &SubmissionEvent,
        schema: Option<&HashMap<String, TargetType>>,
    ) -> Map<String, Value> {
        let mut fields: Map<String, Value> =
            normalize::normalize(&event.answers, &integration.settings.field_mapping, schema)
                .into_iter()
                .collect();

        // Stamp the first timestamp-named column the schema exposes.
        if let Some(schema) = schema {
            for candidate in ["Created", "Submitted", "Date", "Timestamp", "Created At"] {
                if schema.contains_key(candidate) && !fields.contains_key(candidate) {
                    fields.insert(candidate.to_string(), json!(Timestamp::now().to_rfc3339()));
                    break;
                }
            }
        }

        fields
    }

    async fn create_record(
        &self,
        key: &Secret,
        base_id: &str,
        table_id: &str,
        fields: &Map<String, Value>,
    ) -> Result<String, ProviderError> {
        let payload = json!({ "fields": fields });
        let request = OutboundRequest::post(format!("{}/{}/{}", BASE_URL, base_id, table_id))
            .with_bearer(key.as_str())
            .with_json(&payload)?;

        let response = self.transport.execute(request).await?;
        if response.is_success() {
            let body = response.json_value();
            body.get("id")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .ok_or_else(|| ProviderError::UnexpectedResponse {
                    provider: ProviderKind::Airtable,
                    message: "record response missing 'id'".to_string(),
                })
        } else {
            let body = response.json_value();
            Err(ProviderError::Rejected {
                provider: ProviderKind::Airtable,
                status: Some(response.status),
                message: error_message(&body, &response.text(), &["message"]),
            })
        }
    }

    async fn update_record(
        &self,
        key: &Secret,
        base_id: &str,
        table_id: &str,
        record_id: &str,
        fields: &Map<String, Value>,
    ) -> Result<(), ProviderError> {
        let payload = json!({ "fields": fields });
        let request = OutboundRequest::patch(format!(
            "{}/{}/{}/{}",
            BASE_URL, base_id, table_id, record_id
        ))
        .with_bearer(key.as_str())
        .with_json(&payload)?;

        let response = self.transport.execute(request).await?;
        if response.is_success() {
            Ok(())
        } else {
            let body = response.json_value();
            Err(ProviderError::Rejected {
                provider: ProviderKind::Airtable,
                status: Some(response.status),
                message: error_message(&body, &response.text(), &["message"]),
            })
        }
    }

    async fn find_record(
        &self,
        key: &Secret,
        base_id: &str,
        table_id: &str,
        field_name: &str,
        value: &str,
    ) -> Result<Option<String>, ProviderError> {
        let formula = format!("{{{}}} = \"{}\"", field_name, value.replace('"', "\\\""));
        let mut url = url::Url::parse(&format!("{}/{}/{}", BASE_URL, base_id, table_id)).map_err(
            |e| ProviderError::Configuration {
                provider: ProviderKind::Airtable,
                message: format!("invalid base or table id: {}", e),
            },
        )?;
        url.query_pairs_mut()
            .append_pair("filterByFormula", &formula)
            .append_pair("maxRecords", "1");

        let request = OutboundRequest::get(url.to_string()).with_bearer(key.as_str());
        let response = self.transport.execute(request).await?;
        if !response.is_success() {
            let body = response.json_value();
            return Err(ProviderError::Rejected {
                provider: ProviderKind::Airtable,
                status: Some(response.status),
                message: error_message(&body, &response.text(), &["message"]),
            });
        }

        let body = response.json_value();
        Ok(body
            .get("records")
            .and_then(|v| v.as_array())
            .and_then(|records| records.first())
            .and_then(|record| record.get("id"))
            .and_then(|id| id.as_str())
            .map(str::to_string))
    }

    /// Create many rows, chunked to the per-request limit
    ///
    /// Returns the created record ids in input order.
    pub async fn create_records(
        &self,
        credentials: &CredentialBundle,
        base_id: &str,
        table_id: &str,
        rows: &[Map<String, Value>],
    ) -> Result<Vec<String>, ProviderError> {
        let key = self.api_key(credentials)?;
        let mut created = Vec::with_capacity(rows.len());

        for chunk in rows.chunks(MAX_RECORDS_PER_REQUEST) {
            let records: Vec<Value> = chunk
                .iter()
                .map(|fields| json!({ "fields": fields }))
                .collect();
            let payload = json!({ "records": records });
            let request = OutboundRequest::post(format!("{}/{}/{}", BASE_URL, base_id, table_id))
                .with_bearer(key.as_str())
                .with_json(&payload)?;

            let response = self.transport.execute(request).await?;
            if !response.is_success() {
                let body = response.json_value();
                return Err(ProviderError::Rejected {
                    provider: ProviderKind::Airtable,
                    status: Some(response.status),
                    message: error_message(&body, &response.text(), &["message"]),
                });
            }

            let body = response.json_value();
            if let Some(records) = body.get("records").and_then(|v| v.as_array()) {
                created.extend(
                    records
                        .iter()
                        .filter_map(|r| r.get("id").and_then(|id| id.as_str()))
                        .map(str::to_string),
                );
            }
        }

        Ok(created)
    }
}

#[async_trait]
impl ProviderAdapter for AirtableAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Airtable
    }

    async fn test_identity(&self, credentials: &CredentialBundle) -> IdentityCheck {
        let key = match self.api_key(credentials) {
            Ok(key) => key,
            Err(e) => return IdentityCheck::failed(e.to_string()),
        };

        let request = OutboundRequest::get("https://api.airtable.com/v0/meta/whoami")
            .with_bearer(key.as_str());

        match self.transport.execute(request).await {
            Ok(response) if response.is_success() => {
                let body = response.json_value();
                let identity = body
                    .get("email")
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
        let (base_id, table_id) = Self::table_settings(integration)?;

        let schema = self.table_schema(key, base_id, table_id).await;
        let fields = Self::build_fields(integration, event, schema.as_ref());

        // Upsert when a unique field is configured and present in the row.
        if let Some(unique_field) = integration.settings.unique_field.as_deref() {
            if let Some(unique_value) = fields.get(unique_field) {
                let unique_value = normalize::value_to_string(unique_value);
                if let Some(existing_id) = self
                    .find_record(key, base_id, table_id, unique_field, &unique_value)
                    .await?
                {
                    self.update_record(key, base_id, table_id, &existing_id, &fields)
                        .await?;
                    return Ok(PushReceipt::with_record(existing_id).and_detail("row updated"));
                }
            }
        }

        let record_id = self.create_record(key, base_id, table_id, &fields).await?;
        Ok(PushReceipt::with_record(record_id).and_detail("row created"))
    }

    async fn discover(
        &self,
        credentials: &CredentialBundle,
        parent: Option<&str>,
    ) -> Result<Vec<TargetContainer>, ProviderError> {
        let key = self.api_key(credentials)?;

        // With a base id, list its tables; without one, list bases.
        let url = match parent {
            Some(base_id) => format!("https://api.airtable.com/v0/meta/bases/{}/tables", base_id),
            None => "https://api.airtable.com/v0/meta/bases".to_string(),
        };
        let request = OutboundRequest::get(url).with_bearer(key.as_str());

        let response = self.transport.execute(request).await?;
        if !response.is_success() {
            let body = response.json_value();
            return Err(ProviderError::Rejected {
                provider: ProviderKind::Airtable,
                status: Some(response.status),
                message: error_message(&body, &response.text(), &["message"]),
            });
        }

        let body = response.json_value();
        let (items, kind) = match parent {
            Some(_) => (body.get("tables"), "table"),
            None => (body.get("bases"), "base"),
        };
        let items = items
            .and_then(|v| v.as_array())
            .ok_or_else(|| ProviderError::UnexpectedResponse {
                provider: ProviderKind::Airtable,
                message: "missing container array".to_string(),
            })?;

        Ok(items
            .iter()
            .filter_map(|item| {
                let id = item.get("id")?.as_str()?;
                let name = item.get("name")?.as_str()?;
                Some(TargetContainer::new(id, name, kind))
            })
            .collect())
    }
}

#[cfg(test)]
#[path = "airtable_tests.rs"]
mod tests;
