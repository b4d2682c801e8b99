//! Tests for the Twilio SMS adapter

use super::*;
use crate::destination::IntegrationSettings;
use crate::submission::FieldKind;
use crate::test_support::{make_event, make_integration, FakeTransport};
use serde_json::json;

fn sms_credentials() -> CredentialBundle {
    CredentialBundle::Sms {
        account_sid: "AC123".to_string(),
        auth_token: Secret::from_string("token".to_string()),
        from_number: "+15550001111".to_string(),
    }
}

fn twilio_integration(recipients: Vec<&str>) -> ProviderIntegration {
    make_integration(
        ProviderKind::Twilio,
        sms_credentials(),
        IntegrationSettings {
            recipients: recipients.into_iter().map(String::from).collect(),
            ..Default::default()
        },
    )
}

#[test]
fn test_phone_number_formatting() {
    assert_eq!(TwilioAdapter::format_phone_number("(555) 010-2345"), "+15550102345");
    assert_eq!(TwilioAdapter::format_phone_number("+1 555 010 2345"), "+15550102345");
    assert_eq!(TwilioAdapter::format_phone_number("+44 20 7946 0958"), "+442079460958");
}

#[test]
fn test_message_leads_with_identity_fields() {
    let event = make_event(vec![
        ("Favorite color", FieldKind::ShortText, json!("teal")),
        ("Name", FieldKind::ShortText, json!("Ann")),
        ("Email", FieldKind::Email, json!("ann@x.com")),
    ]);

    let message = TwilioAdapter::build_message(&event);

    let name_pos = message.find("Name: Ann").expect("name included");
    let email_pos = message.find("Email: ann@x.com").expect("email included");
    let color_pos = message.find("Favorite color: teal").expect("other field included");
    assert!(name_pos < color_pos);
    assert!(email_pos < color_pos);
}

#[test]
fn test_message_respects_character_budget() {
    let answers: Vec<(String, FieldKind, serde_json::Value)> = (0..40)
        .map(|i| {
            (
                format!("Question {:02}", i),
                FieldKind::LongText,
                json!("y".repeat(100)),
            )
        })
        .collect();
    let event = make_event(
        answers
            .iter()
            .map(|(label, kind, value)| (label.as_str(), *kind, value.clone()))
            .collect(),
    );

    let message = TwilioAdapter::build_message(&event);
    assert!(message.len() <= 1600, "hard cap respected, got {}", message.len());
}

#[tokio::test]
async fn test_push_fans_out_per_recipient() {
    let transport = FakeTransport::new();
    transport.push_response(201, json!({"sid": "SM1", "status": "queued"}));
    transport.push_response(201, json!({"sid": "SM2", "status": "queued"}));
    let adapter = TwilioAdapter::new(Arc::new(transport.clone()));

    let event = make_event(vec![("Name", FieldKind::ShortText, json!("Ann"))]);
    let integration = twilio_integration(vec!["5550102345", "5550106789"]);

    let receipt = adapter.push(&integration, &event).await.expect("push succeeds");
    assert_eq!(receipt.detail.as_deref(), Some("2/2 messages sent"));

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0]
        .url
        .ends_with("/Accounts/AC123/Messages.json"));
    assert_eq!(
        requests[0].basic_auth,
        Some(("AC123".to_string(), "token".to_string()))
    );

    let body = String::from_utf8(requests[0].body.as_ref().unwrap().to_vec()).unwrap();
    assert!(body.contains("To=%2B15550102345"));
    assert!(body.contains("From=%2B15550001111"));
}

#[tokio::test]
async fn test_partial_success_reports_per_recipient_outcomes() {
    let transport = FakeTransport::new();
    transport.push_response(201, json!({"sid": "SM1"}));
    transport.push_response(400, json!({"message": "Invalid 'To' number"}));
    let adapter = TwilioAdapter::new(Arc::new(transport));

    let event = make_event(vec![("Name", FieldKind::ShortText, json!("Ann"))]);
    let integration = twilio_integration(vec!["5550102345", "bogus"]);

    let receipt = adapter.push(&integration, &event).await.expect("partial success is ok");
    let detail = receipt.detail.unwrap();
    assert!(detail.contains("1/2 messages sent"));
    assert!(detail.contains("Invalid 'To' number"));
}

#[tokio::test]
async fn test_all_recipients_failing_is_an_error() {
    let transport = FakeTransport::new();
    transport.push_response(400, json!({"message": "bad"}));
    transport.push_response(400, json!({"message": "bad"}));
    let adapter = TwilioAdapter::new(Arc::new(transport));

    let event = make_event(vec![("Name", FieldKind::ShortText, json!("Ann"))]);
    let integration = twilio_integration(vec!["a", "b"]);

    let error = adapter.push(&integration, &event).await.unwrap_err();
    assert!(matches!(error, ProviderError::Rejected { .. }));
}

#[tokio::test]
async fn test_push_requires_recipients() {
    let adapter = TwilioAdapter::new(Arc::new(FakeTransport::new()));
    let event = make_event(vec![("Name", FieldKind::ShortText, json!("Ann"))]);
    let integration = twilio_integration(Vec::new());

    let error = adapter.push(&integration, &event).await.unwrap_err();
    assert!(matches!(error, ProviderError::Configuration { .. }));
}

#[tokio::test]
async fn test_identity_check_reports_account_name() {
    let transport = FakeTransport::new();
    transport.push_response(
        200,
        json!({"friendly_name": "Acme Notifications", "status": "active"}),
    );
    let adapter = TwilioAdapter::new(Arc::new(transport));

    let check = adapter.test_identity(&sms_credentials()).await;
    assert!(check.success);
    assert_eq!(check.identity.as_deref(), Some("Acme Notifications"));
}
