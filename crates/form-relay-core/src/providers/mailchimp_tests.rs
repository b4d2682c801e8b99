//! Tests for the Mailchimp contact-list adapter

use super::*;
use crate::destination::IntegrationSettings;
use crate::submission::FieldKind;
use crate::test_support::{api_key_credentials, make_event, make_integration, FakeTransport};
use serde_json::json;

fn make_mailchimp_integration(settings: IntegrationSettings) -> ProviderIntegration {
    make_integration(
        ProviderKind::Mailchimp,
        api_key_credentials("abc123-us6"),
        settings,
    )
}

#[test]
fn test_base_url_from_api_key_data_center() {
    let key = Secret::from_string("abc123-us6".to_string());
    assert_eq!(
        MailchimpAdapter::base_url(&key),
        "https://us6.api.mailchimp.com/3.0"
    );

    let bare = Secret::from_string("no-dc".to_string());
    assert_eq!(
        MailchimpAdapter::base_url(&bare),
        "https://dc.api.mailchimp.com/3.0"
    );
}

#[test]
fn test_subscriber_hash_is_md5_of_lowercased_email() {
    // Well-known MD5 test vector for the lowercased address.
    assert_eq!(
        MailchimpAdapter::subscriber_hash("URIST@mcvankab.com"),
        MailchimpAdapter::subscriber_hash("urist@mcvankab.com"),
    );
    assert_eq!(MailchimpAdapter::subscriber_hash("urist@mcvankab.com").len(), 32);
}

#[tokio::test]
async fn test_push_upserts_by_subscriber_hash() {
    let transport = FakeTransport::new();
    transport.push_response(200, json!({"id": "member-1", "status": "subscribed"}));
    let adapter = MailchimpAdapter::new(Arc::new(transport.clone()));

    let event = make_event(vec![
        ("Email", FieldKind::Email, json!("Ann@X.com")),
        ("First Name", FieldKind::ShortText, json!("Ann")),
    ]);
    let integration = make_mailchimp_integration(IntegrationSettings {
        list_id: Some("list-9".to_string()),
        ..Default::default()
    });

    let receipt = adapter.push(&integration, &event).await.expect("push succeeds");

    assert_eq!(receipt.record_id.as_deref(), Some("member-1"));

    let request = &transport.requests()[0];
    assert_eq!(request.method, crate::transport::HttpMethod::Put);
    assert!(request.url.starts_with("https://us6.api.mailchimp.com/3.0/lists/list-9/members/"));
    assert!(request
        .url
        .ends_with(&MailchimpAdapter::subscriber_hash("Ann@X.com")));

    let body: serde_json::Value = serde_json::from_slice(request.body.as_ref().unwrap()).unwrap();
    assert_eq!(body["email_address"], "Ann@X.com");
    assert_eq!(body["status_if_new"], "subscribed");
    assert_eq!(body["merge_fields"]["FNAME"], "Ann", "alias heuristic fills FNAME");
}

#[tokio::test]
async fn test_push_without_email_is_hard_failure() {
    let transport = FakeTransport::new();
    let adapter = MailchimpAdapter::new(Arc::new(transport.clone()));

    let event = make_event(vec![("Favorite color", FieldKind::ShortText, json!("teal"))]);
    let integration = make_mailchimp_integration(IntegrationSettings {
        list_id: Some("list-9".to_string()),
        ..Default::default()
    });

    let error = adapter.push(&integration, &event).await.unwrap_err();
    assert!(matches!(error, ProviderError::MissingIdentity(_)));
    assert_eq!(transport.request_count(), 0, "no request without identity");
}

#[tokio::test]
async fn test_push_requires_list_configuration() {
    let adapter = MailchimpAdapter::new(Arc::new(FakeTransport::new()));
    let event = make_event(vec![("Email", FieldKind::Email, json!("a@x.com"))]);
    let integration = make_mailchimp_integration(IntegrationSettings::default());

    let error = adapter.push(&integration, &event).await.unwrap_err();
    assert!(matches!(error, ProviderError::Configuration { .. }));
}

#[tokio::test]
async fn test_push_custom_merge_fields_and_tags() {
    let transport = FakeTransport::new();
    let adapter = MailchimpAdapter::new(Arc::new(transport.clone()));

    let event = make_event(vec![
        ("Email", FieldKind::Email, json!("a@x.com")),
        ("Shirt size", FieldKind::Dropdown, json!("L")),
    ]);
    let mut settings = IntegrationSettings {
        list_id: Some("list-9".to_string()),
        tags: vec!["form-lead".to_string()],
        ..Default::default()
    };
    settings.field_mapping.insert(
        event.answers[1].field_id.to_string(),
        "SHIRTSIZE".to_string(),
    );
    let integration = make_mailchimp_integration(settings);

    adapter.push(&integration, &event).await.expect("push succeeds");

    let body: serde_json::Value =
        serde_json::from_slice(transport.requests()[0].body.as_ref().unwrap()).unwrap();
    assert_eq!(body["merge_fields"]["SHIRTSIZE"], "L");
    assert_eq!(body["tags"], json!(["form-lead"]));
}

#[tokio::test]
async fn test_push_surfaces_provider_error_detail() {
    let transport = FakeTransport::new();
    transport.push_response(
        400,
        json!({"detail": "ann@x.com looks fake or invalid"}),
    );
    let adapter = MailchimpAdapter::new(Arc::new(transport));

    let event = make_event(vec![("Email", FieldKind::Email, json!("ann@x.com"))]);
    let integration = make_mailchimp_integration(IntegrationSettings {
        list_id: Some("list-9".to_string()),
        ..Default::default()
    });

    let error = adapter.push(&integration, &event).await.unwrap_err();
    match error {
        ProviderError::Rejected { status, message, .. } => {
            assert_eq!(status, Some(400));
            assert_eq!(message, "ann@x.com looks fake or invalid");
        }
        other => panic!("expected Rejected, got {:?}", other),
    }
}

#[tokio::test]
async fn test_identity_check_reports_health() {
    let transport = FakeTransport::new();
    transport.push_response(200, json!({"health_status": "Everything's Chimpy!"}));
    let adapter = MailchimpAdapter::new(Arc::new(transport));

    let check = adapter.test_identity(&api_key_credentials("k-us1")).await;
    assert!(check.success);
    assert_eq!(check.identity.as_deref(), Some("Everything's Chimpy!"));
}

#[tokio::test]
async fn test_identity_check_wrong_credential_shape() {
    let adapter = MailchimpAdapter::new(Arc::new(FakeTransport::new()));
    let creds = CredentialBundle::WebhookUrl {
        url: "https://discord.com/api/webhooks/1".to_string(),
    };

    let check = adapter.test_identity(&creds).await;
    assert!(!check.success);
}

#[tokio::test]
async fn test_discover_lists_audiences() {
    let transport = FakeTransport::new();
    transport.push_response(
        200,
        json!({"lists": [
            {"id": "l1", "name": "Newsletter", "stats": {"member_count": 10}},
            {"id": "l2", "name": "Beta", "stats": {"member_count": 2}},
        ]}),
    );
    let adapter = MailchimpAdapter::new(Arc::new(transport));

    let containers = adapter
        .discover(&api_key_credentials("k-us1"), None)
        .await
        .expect("discovery succeeds");

    assert_eq!(containers.len(), 2);
    assert_eq!(containers[0].id, "l1");
    assert_eq!(containers[0].name, "Newsletter");
    assert_eq!(containers[0].kind, "audience");
}
