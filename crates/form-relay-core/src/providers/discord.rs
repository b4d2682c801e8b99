//! Chat-notification adapter for Discord channel webhooks.
//!
//! Builds a rich embed from the full labeled answer set, independent of any
//! explicit field mapping. Discord caps embeds at 25 fields, 256-char names
//! and 1024-char values; the adapter truncates rather than erroring.

use super::{error_message, IdentityCheck, ProviderAdapter, ProviderError, PushReceipt, TargetContainer};
use crate::destination::{CredentialBundle, ProviderIntegration, ProviderKind};
use crate::normalize;
use crate::submission::SubmissionEvent;
use crate::transport::{HttpTransport, OutboundRequest};
use crate::Timestamp;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

const MAX_FIELDS: usize = 25;
const MAX_NAME_LEN: usize = 256;
const MAX_VALUE_LEN: usize = 1024;
const DEFAULT_COLOR: u32 = 0x00f5_9e0b;

/// Posts submission notifications to a Discord channel webhook
pub struct DiscordAdapter {
    transport: Arc<dyn HttpTransport>,
}

impl DiscordAdapter {
    /// Create new adapter
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    fn webhook_url<'a>(&self, credentials: &'a CredentialBundle) -> Result<&'a str, ProviderError> {
        match credentials {
            CredentialBundle::WebhookUrl { url } => Ok(url),
            _ => Err(ProviderError::CredentialMismatch {
                provider: ProviderKind::Discord,
                expected: "webhook URL",
            }),
        }
    }

    fn is_discord_webhook(url: &str) -> bool {
        url.contains("discord.com/api/webhooks/")
    }

    fn truncate(text: &str, max: usize) -> String {
        if text.chars().count() <= max {
            text.to_string()
        } else {
            let truncated: String = text.chars().take(max.saturating_sub(3)).collect();
            format!("{}...", truncated)
        }
    }

    /// Build the embed for one submission
    pub fn build_embed(integration: &ProviderIntegration, event: &SubmissionEvent) -> Value {
        let mut fields = Vec::new();
        for (label, value) in event.labeled_answers() {
            if matches!(&value, Value::Null)
                || matches!(&value, Value::String(s) if s.is_empty())
            {
                continue;
            }
            if fields.len() >= MAX_FIELDS {
                break;
            }

            let display = normalize::value_to_string(&value);
            let display = if display.is_empty() { "-".to_string() } else { display };
            let inline = display.chars().count() < 50;
            fields.push(json!({
                "name": Self::truncate(&label, MAX_NAME_LEN),
                "value": Self::truncate(&display, MAX_VALUE_LEN),
                "inline": inline,
            }));
        }

        json!({
            "title": format!("New Submission: {}", event.form_title),
            "color": integration.settings.embed_color.unwrap_or(DEFAULT_COLOR),
            "timestamp": Timestamp::now().to_rfc3339(),
            "footer": { "text": "Form Relay" },
            "fields": fields,
        })
    }
}

#[async_trait]
impl ProviderAdapter for DiscordAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Discord
    }

    async fn test_identity(&self, credentials: &CredentialBundle) -> IdentityCheck {
        let url = match self.webhook_url(credentials) {
            Ok(url) => url,
            Err(e) => return IdentityCheck::failed(e.to_string()),
        };
        if !Self::is_discord_webhook(url) {
            return IdentityCheck::failed("Invalid webhook URL");
        }

        // Discord returns the webhook's metadata on a plain GET.
        match self.transport.execute(OutboundRequest::get(url)).await {
            Ok(response) if response.is_success() => {
                let body = response.json_value();
                let name = body
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("webhook")
                    .to_string();
                IdentityCheck::ok(name)
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
        let url = self.webhook_url(&integration.credentials)?;
        if !Self::is_discord_webhook(url) {
            return Err(ProviderError::Configuration {
                provider: ProviderKind::Discord,
                message: "webhook URL is not a Discord webhook".to_string(),
            });
        }

        let payload = json!({ "embeds": [Self::build_embed(integration, event)] });
        let request = OutboundRequest::post(url).with_json(&payload)?;

        let response = self.transport.execute(request).await?;
        if response.is_success() {
            Ok(PushReceipt::with_detail("notification posted"))
        } else {
            let body = response.json_value();
            Err(ProviderError::Rejected {
                provider: ProviderKind::Discord,
                status: Some(response.status),
                message: error_message(&body, &response.text(), &["message"]),
            })
        }
    }

    async fn discover(
        &self,
        _credentials: &CredentialBundle,
        _parent: Option<&str>,
    ) -> Result<Vec<TargetContainer>, ProviderError> {
        // The webhook URL already names the channel; there is nothing to list.
        Err(ProviderError::Unsupported {
            provider: ProviderKind::Discord,
            operation: "container discovery",
        })
    }
}

#[cfg(test)]
#[path = "discord_tests.rs"]
mod tests;
