//! Chat-notification adapter for Slack incoming webhooks.
//!
//! Renders the labeled answer set as Block Kit sections, two fields per
//! section, under a header block naming the form.

use super::{IdentityCheck, ProviderAdapter, ProviderError, PushReceipt, TargetContainer};
use crate::destination::{CredentialBundle, ProviderIntegration, ProviderKind};
use crate::normalize;
use crate::submission::SubmissionEvent;
use crate::transport::{HttpTransport, OutboundRequest};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

/// Posts submission notifications to a Slack incoming webhook
pub struct SlackAdapter {
    transport: Arc<dyn HttpTransport>,
}

impl SlackAdapter {
    /// Create new adapter
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    fn webhook_url<'a>(&self, credentials: &'a CredentialBundle) -> Result<&'a str, ProviderError> {
        match credentials {
            CredentialBundle::WebhookUrl { url } => Ok(url),
            _ => Err(ProviderError::CredentialMismatch {
                provider: ProviderKind::Slack,
                expected: "webhook URL",
            }),
        }
    }

    fn is_slack_webhook(url: &str) -> bool {
        url.contains("hooks.slack.com/")
    }

    /// Build the Block Kit message for one submission
    pub fn build_blocks(event: &SubmissionEvent) -> Vec<Value> {
        let mut blocks = vec![
            json!({
                "type": "header",
                "text": {
                    "type": "plain_text",
                    "text": format!("New Submission: {}", event.form_title),
                },
            }),
            json!({ "type": "divider" }),
        ];

        let fields: Vec<Value> = event
            .labeled_answers()
            .into_iter()
            .map(|(label, value)| {
                let display = normalize::value_to_string(&value);
                let display = if display.is_empty() { "-".to_string() } else { display };
                json!({ "type": "mrkdwn", "text": format!("*{}*\n{}", label, display) })
            })
            .collect();

        for pair in fields.chunks(2) {
            blocks.push(json!({ "type": "section", "fields": pair }));
        }

        blocks
    }
}

#[async_trait]
impl ProviderAdapter for SlackAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Slack
    }

    async fn test_identity(&self, credentials: &CredentialBundle) -> IdentityCheck {
        // Posting a probe message would spam the channel, so the check is
        // limited to validating the webhook URL shape.
        let url = match self.webhook_url(credentials) {
            Ok(url) => url,
            Err(e) => return IdentityCheck::failed(e.to_string()),
        };

        if Self::is_slack_webhook(url) {
            let host = url::Url::parse(url)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string))
                .unwrap_or_else(|| "hooks.slack.com".to_string());
            IdentityCheck::ok(host)
        } else {
            IdentityCheck::failed("Invalid webhook URL")
        }
    }

    async fn push(
        &self,
        integration: &ProviderIntegration,
        event: &SubmissionEvent,
    ) -> Result<PushReceipt, ProviderError> {
        let url = self.webhook_url(&integration.credentials)?;
        if !Self::is_slack_webhook(url) {
            return Err(ProviderError::Configuration {
                provider: ProviderKind::Slack,
                message: "webhook URL is not a Slack webhook".to_string(),
            });
        }

        let payload = json!({
            "text": format!("New submission for {}", event.form_title),
            "blocks": Self::build_blocks(event),
        });
        let request = OutboundRequest::post(url).with_json(&payload)?;

        let response = self.transport.execute(request).await?;
        if response.is_success() {
            Ok(PushReceipt::with_detail("notification posted"))
        } else {
            // Slack incoming webhooks answer with a plain-text error body.
            Err(ProviderError::Rejected {
                provider: ProviderKind::Slack,
                status: Some(response.status),
                message: response.text(),
            })
        }
    }

    async fn discover(
        &self,
        _credentials: &CredentialBundle,
        _parent: Option<&str>,
    ) -> Result<Vec<TargetContainer>, ProviderError> {
        Err(ProviderError::Unsupported {
            provider: ProviderKind::Slack,
            operation: "container discovery",
        })
    }
}
