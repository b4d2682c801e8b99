//! SMS notification adapter for Twilio.
//!
//! Message bodies lead with identity-like fields, then fill remaining space
//! up to a hard character budget. Recipients fan out independently; partial
//! success is a valid outcome reported per recipient.

use super::{error_message, IdentityCheck, ProviderAdapter, ProviderError, PushReceipt, TargetContainer};
use crate::destination::{CredentialBundle, ProviderIntegration, ProviderKind, Secret};
use crate::normalize;
use crate::submission::SubmissionEvent;
use crate::transport::{HttpTransport, OutboundRequest};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

const BASE_URL: &str = "https://api.twilio.com/2010-04-01";

/// Labels treated as identity-like and placed first in the message
const PRIORITY_FIELDS: &[&str] = &["name", "email", "phone", "message"];

/// Soft budget at which no further fields are started
const SOFT_BUDGET: usize = 1400;
/// A field line may still be added if the total stays under this
const LINE_BUDGET: usize = 1500;
/// Twilio's hard per-message cap
const HARD_CAP: usize = 1600;

/// Sends submission notifications over SMS
pub struct TwilioAdapter {
    transport: Arc<dyn HttpTransport>,
}

struct SmsCredentials<'a> {
    account_sid: &'a str,
    auth_token: &'a Secret,
    from_number: &'a str,
}

impl TwilioAdapter {
    /// Create new adapter
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    fn credentials<'a>(
        &self,
        credentials: &'a CredentialBundle,
    ) -> Result<SmsCredentials<'a>, ProviderError> {
        match credentials {
            CredentialBundle::Sms {
                account_sid,
                auth_token,
                from_number,
            } => Ok(SmsCredentials {
                account_sid,
                auth_token,
                from_number,
            }),
            _ => Err(ProviderError::CredentialMismatch {
                provider: ProviderKind::Twilio,
                expected: "SMS gateway",
            }),
        }
    }

    /// Normalize a phone number to E.164, assuming US when no country code
    pub fn format_phone_number(phone: &str) -> String {
        let mut digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.len() == 10 {
            digits.insert(0, '1');
        }
        format!("+{}", digits)
    }

    /// Compose the notification body within the character budget
    pub fn build_message(event: &SubmissionEvent) -> String {
        let labeled = event.labeled_answers();
        let mut message = format!("New submission: {}\n\n", event.form_title);
        let mut added: Vec<&String> = Vec::new();

        for (label, value) in &labeled {
            let label_lower = label.to_lowercase();
            if PRIORITY_FIELDS.iter().any(|pf| label_lower.contains(pf)) {
                message.push_str(&format!(
                    "{}: {}\n",
                    label,
                    normalize::value_to_string(value)
                ));
                added.push(label);
            }
        }

        for (label, value) in &labeled {
            if added.contains(&label) || message.len() >= SOFT_BUDGET {
                continue;
            }
            let line = format!("{}: {}\n", label, normalize::value_to_string(value));
            if message.len() + line.len() < LINE_BUDGET {
                message.push_str(&line);
            }
        }

        let trimmed = message.trim_end().to_string();
        if trimmed.len() > HARD_CAP {
            trimmed.chars().take(HARD_CAP).collect()
        } else {
            trimmed
        }
    }

    async fn send_sms(
        &self,
        creds: &SmsCredentials<'_>,
        to: &str,
        body: &str,
    ) -> Result<String, ProviderError> {
        let to_number = Self::format_phone_number(to);
        let url = format!("{}/Accounts/{}/Messages.json", BASE_URL, creds.account_sid);
        let request = OutboundRequest::post(url)
            .with_basic_auth(creds.account_sid, creds.auth_token.as_str())
            .with_form(&[
                ("To", to_number.as_str()),
                ("From", creds.from_number),
                ("Body", body),
            ]);

        let response = self.transport.execute(request).await?;
        if response.is_success() {
            let parsed = response.json_value();
            Ok(parsed
                .get("sid")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string())
        } else {
            let parsed = response.json_value();
            Err(ProviderError::Rejected {
                provider: ProviderKind::Twilio,
                status: Some(response.status),
                message: error_message(&parsed, &response.text(), &["message"]),
            })
        }
    }
}

#[async_trait]
impl ProviderAdapter for TwilioAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Twilio
    }

    async fn test_identity(&self, credentials: &CredentialBundle) -> IdentityCheck {
        let creds = match self.credentials(credentials) {
            Ok(creds) => creds,
            Err(e) => return IdentityCheck::failed(e.to_string()),
        };

        let request = OutboundRequest::get(format!(
            "{}/Accounts/{}.json",
            BASE_URL, creds.account_sid
        ))
        .with_basic_auth(creds.account_sid, creds.auth_token.as_str());

        match self.transport.execute(request).await {
            Ok(response) if response.is_success() => {
                let body = response.json_value();
                let name = body
                    .get("friendly_name")
                    .and_then(|v| v.as_str())
                    .unwrap_or(creds.account_sid)
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
        let creds = self.credentials(&integration.credentials)?;
        let recipients = &integration.settings.recipients;
        if recipients.is_empty() {
            return Err(ProviderError::Configuration {
                provider: ProviderKind::Twilio,
                message: "no SMS recipients configured".to_string(),
            });
        }

        let body = Self::build_message(event);

        // Each recipient is independent; one bad number must not block the rest.
        let mut delivered = 0usize;
        let mut failures: Vec<String> = Vec::new();
        for recipient in recipients {
            match self.send_sms(&creds, recipient, &body).await {
                Ok(_sid) => delivered += 1,
                Err(e) => {
                    warn!(
                        integration = %integration.id,
                        recipient = %recipient,
                        error = %e,
                        "SMS delivery to recipient failed"
                    );
                    failures.push(format!("{}: {}", recipient, e));
                }
            }
        }

        if delivered == 0 {
            return Err(ProviderError::Rejected {
                provider: ProviderKind::Twilio,
                status: None,
                message: failures.join("; "),
            });
        }

        let detail = if failures.is_empty() {
            format!("{}/{} messages sent", delivered, recipients.len())
        } else {
            format!(
                "{}/{} messages sent; failed: {}",
                delivered,
                recipients.len(),
                failures.join("; ")
            )
        };
        Ok(PushReceipt::with_detail(detail))
    }

    async fn discover(
        &self,
        _credentials: &CredentialBundle,
        _parent: Option<&str>,
    ) -> Result<Vec<TargetContainer>, ProviderError> {
        Err(ProviderError::Unsupported {
            provider: ProviderKind::Twilio,
            operation: "container discovery",
        })
    }
}

#[cfg(test)]
#[path = "twilio_tests.rs"]
mod tests;
