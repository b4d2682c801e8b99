//! Table-row sync adapter for Google Sheets.
//!
//! Reads the header row, aligns labeled answers to columns
//! case-insensitively, stamps a `Timestamp` column when one exists, and
//! appends the row with user-entered value interpretation.

use super::{error_message, IdentityCheck, ProviderAdapter, ProviderError, PushReceipt, TargetContainer};
use crate::destination::{CredentialBundle, ProviderIntegration, ProviderKind, Secret};
use crate::normalize;
use crate::submission::SubmissionEvent;
use crate::transport::{HttpTransport, OutboundRequest};
use crate::Timestamp;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

const BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Appends submissions as Google Sheets rows
pub struct GoogleSheetsAdapter {
    transport: Arc<dyn HttpTransport>,
}

impl GoogleSheetsAdapter {
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
                provider: ProviderKind::GoogleSheets,
                expected: "access token",
            }),
        }
    }

    fn spreadsheet_id(integration: &ProviderIntegration) -> Result<&str, ProviderError> {
        integration
            .settings
            .spreadsheet_id
            .as_deref()
            .ok_or_else(|| ProviderError::Configuration {
                provider: ProviderKind::GoogleSheets,
                message: "no spreadsheet configured".to_string(),
            })
    }

    async fn header_row(
        &self,
        token: &Secret,
        spreadsheet_id: &str,
        sheet_name: &str,
    ) -> Result<Vec<String>, ProviderError> {
        let range = format!("{}!1:1", sheet_name);
        let request = OutboundRequest::get(format!(
            "{}/{}/values/{}",
            BASE_URL, spreadsheet_id, range
        ))
        .with_bearer(token.as_str());

        let response = self.transport.execute(request).await?;
        if !response.is_success() {
            let body = response.json_value();
            return Err(ProviderError::Rejected {
                provider: ProviderKind::GoogleSheets,
                status: Some(response.status),
                message: error_message(&body, &response.text(), &["message"]),
            });
        }

        let body = response.json_value();
        Ok(body
            .get("values")
            .and_then(|v| v.as_array())
            .and_then(|rows| rows.first())
            .and_then(|row| row.as_array())
            .map(|cells| {
                cells
                    .iter()
                    .map(|cell| cell.as_str().unwrap_or_default().to_string())
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Align labeled answers to the sheet's columns
    pub fn build_row(headers: &[String], event: &SubmissionEvent) -> Vec<String> {
        let labeled = event.labeled_answers();

        headers
            .iter()
            .map(|header| {
                if header.eq_ignore_ascii_case("timestamp") {
                    return Timestamp::now().to_rfc3339();
                }
                labeled
                    .iter()
                    .find(|(label, _)| label.eq_ignore_ascii_case(header))
                    .map(|(_, value)| normalize::value_to_string(value))
                    .unwrap_or_default()
            })
            .collect()
    }
}

#[async_trait]
impl ProviderAdapter for GoogleSheetsAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GoogleSheets
    }

    async fn test_identity(&self, credentials: &CredentialBundle) -> IdentityCheck {
        // Without a spreadsheet id there is nothing safe to probe beyond the
        // token itself; the token-info endpoint reports validity.
        let token = match self.access_token(credentials) {
            Ok(token) => token,
            Err(e) => return IdentityCheck::failed(e.to_string()),
        };

        let request = OutboundRequest::get(format!(
            "https://www.googleapis.com/oauth2/v3/tokeninfo?access_token={}",
            token.as_str()
        ));

        match self.transport.execute(request).await {
            Ok(response) if response.is_success() => {
                let body = response.json_value();
                let identity = body
                    .get("email")
                    .and_then(|v| v.as_str())
                    .unwrap_or("google account")
                    .to_string();
                IdentityCheck::ok(identity)
            }
            Ok(response) => {
                let body = response.json_value();
                IdentityCheck::failed(error_message(
                    &body,
                    &response.text(),
                    &["error_description", "error"],
                ))
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
        let spreadsheet_id = Self::spreadsheet_id(integration)?;
        let sheet_name = integration
            .settings
            .sheet_name
            .as_deref()
            .unwrap_or("Sheet1");

        let headers = self.header_row(token, spreadsheet_id, sheet_name).await?;
        if headers.is_empty() {
            return Err(ProviderError::Configuration {
                provider: ProviderKind::GoogleSheets,
                message: format!("sheet '{}' has no header row", sheet_name),
            });
        }

        let row = Self::build_row(&headers, event);
        let payload = json!({ "values": [row] });
        let url = format!(
            "{}/{}/values/{}!A:Z:append?valueInputOption=USER_ENTERED",
            BASE_URL, spreadsheet_id, sheet_name
        );
        let request = OutboundRequest::post(url)
            .with_bearer(token.as_str())
            .with_json(&payload)?;

        let response = self.transport.execute(request).await?;
        if response.is_success() {
            let body = response.json_value();
            let range = body
                .get("updates")
                .and_then(|u| u.get("updatedRange"))
                .and_then(|v| v.as_str())
                .unwrap_or(sheet_name)
                .to_string();
            Ok(PushReceipt::with_detail(format!("row appended at {}", range)))
        } else {
            let body = response.json_value();
            Err(ProviderError::Rejected {
                provider: ProviderKind::GoogleSheets,
                status: Some(response.status),
                message: error_message(&body, &response.text(), &["message"]),
            })
        }
    }

    async fn discover(
        &self,
        credentials: &CredentialBundle,
        parent: Option<&str>,
    ) -> Result<Vec<TargetContainer>, ProviderError> {
        // Sheets has no listing API scoped to the token alone; with a
        // spreadsheet id the individual sheets can be enumerated.
        let token = self.access_token(credentials)?;
        let Some(spreadsheet_id) = parent else {
            return Err(ProviderError::Unsupported {
                provider: ProviderKind::GoogleSheets,
                operation: "spreadsheet discovery without a spreadsheet id",
            });
        };

        let request = OutboundRequest::get(format!("{}/{}", BASE_URL, spreadsheet_id))
            .with_bearer(token.as_str());

        let response = self.transport.execute(request).await?;
        if !response.is_success() {
            let body = response.json_value();
            return Err(ProviderError::Rejected {
                provider: ProviderKind::GoogleSheets,
                status: Some(response.status),
                message: error_message(&body, &response.text(), &["message"]),
            });
        }

        let body = response.json_value();
        let sheets = body
            .get("sheets")
            .and_then(|v| v.as_array())
            .ok_or_else(|| ProviderError::UnexpectedResponse {
                provider: ProviderKind::GoogleSheets,
                message: "missing 'sheets' array".to_string(),
            })?;

        Ok(sheets
            .iter()
            .filter_map(|sheet| {
                let properties = sheet.get("properties")?;
                let id = properties.get("sheetId")?.to_string();
                let title = properties.get("title")?.as_str()?;
                Some(TargetContainer::new(id, title, "sheet"))
            })
            .collect())
    }
}
