//! Shared test doubles and fixtures.

use crate::destination::{CredentialBundle, IntegrationSettings, ProviderIntegration, ProviderKind, Secret};
use crate::submission::{FieldAnswer, FieldKind, SubmissionEvent};
use crate::transport::{HttpTransport, OutboundRequest, OutboundResponse, TransportError};
use crate::{AccountId, DestinationId, FieldId, FormId, SubmissionId, Timestamp};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Fake Transport
// ============================================================================

/// Recording transport that replays scripted responses in order
///
/// When the script runs dry it answers `200 {}`, so most tests only script
/// the interesting exchange.
#[derive(Clone, Default)]
pub struct FakeTransport {
    requests: Arc<Mutex<Vec<OutboundRequest>>>,
    responses: Arc<Mutex<VecDeque<Result<OutboundResponse, TransportError>>>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a JSON response
    pub fn push_response(&self, status: u16, body: Value) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(OutboundResponse::new(
                status,
                Bytes::from(body.to_string()),
            )));
    }

    /// Queue a transport failure
    pub fn push_error(&self) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(TransportError::Connect {
                message: "connection refused".to_string(),
            }));
    }

    /// Queue a timeout failure
    pub fn push_timeout(&self) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(TransportError::Timeout {
                timeout: Duration::from_secs(30),
            }));
    }

    /// All requests issued so far
    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Look up a header on the n-th request
    pub fn header(&self, request_index: usize, name: &str) -> Option<String> {
        self.requests.lock().unwrap().get(request_index).and_then(|request| {
            request
                .headers
                .iter()
                .find(|(header, _)| header.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.clone())
        })
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn execute(&self, request: OutboundRequest) -> Result<OutboundResponse, TransportError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(OutboundResponse::new(200, Bytes::from_static(b"{}"))))
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// Submission with the given `(label, kind, value)` answers
pub fn make_event(answers: Vec<(&str, FieldKind, Value)>) -> SubmissionEvent {
    SubmissionEvent {
        submission_id: SubmissionId::new(),
        form_id: FormId::new(),
        form_title: "Contact Form".to_string(),
        form_public_id: "pub123".to_string(),
        account_id: AccountId::new(),
        answers: answers
            .into_iter()
            .map(|(label, kind, value)| FieldAnswer::new(FieldId::new(), label, kind, value))
            .collect(),
        completed_at: Timestamp::now(),
    }
}

/// Integration fixture with default settings
pub fn make_integration(
    provider: ProviderKind,
    credentials: CredentialBundle,
    settings: IntegrationSettings,
) -> ProviderIntegration {
    ProviderIntegration {
        id: DestinationId::new(),
        account: AccountId::new(),
        form: FormId::new(),
        provider,
        credentials,
        settings,
        active: true,
    }
}

/// API-key credentials fixture
pub fn api_key_credentials(key: &str) -> CredentialBundle {
    CredentialBundle::ApiKey {
        key: Secret::from_string(key.to_string()),
    }
}

/// Mapping from the event's n-th answer field id to a destination field
pub fn map_field(event: &SubmissionEvent, index: usize, target: &str) -> (String, String) {
    (
        event.answers[index].field_id.to_string(),
        target.to_string(),
    )
}
