//! Tests for the HubSpot CRM adapter

use super::*;
use crate::destination::IntegrationSettings;
use crate::submission::FieldKind;
use crate::test_support::{make_event, make_integration, FakeTransport};
use serde_json::json;

fn hubspot_integration(settings: IntegrationSettings) -> ProviderIntegration {
    make_integration(
        ProviderKind::Hubspot,
        CredentialBundle::AccessToken {
            token: Secret::from_string("pat-token".to_string()),
        },
        settings,
    )
}

#[tokio::test]
async fn test_auto_resolution_without_mapping_upserts_contact() {
    // {name: "Ann", email: "ann@x.com"} with no explicit mapping resolves
    // the email by regex and the name by alias heuristic.
    let transport = FakeTransport::new();
    transport.push_response(200, json!({"results": []})); // search: no match
    transport.push_response(201, json!({"id": "301"})); // create
    let adapter = HubspotAdapter::new(Arc::new(transport.clone()));

    let event = make_event(vec![
        ("name", FieldKind::ShortText, json!("Ann")),
        ("contact", FieldKind::ShortText, json!("ann@x.com")),
    ]);
    let integration = hubspot_integration(IntegrationSettings::default());

    let receipt = adapter.push(&integration, &event).await.expect("push succeeds");
    assert_eq!(receipt.record_id.as_deref(), Some("301"));

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);

    // Search keyed on the detected email.
    let search: serde_json::Value =
        serde_json::from_slice(requests[0].body.as_ref().unwrap()).unwrap();
    assert_eq!(
        search["filterGroups"][0]["filters"][0]["value"],
        "ann@x.com"
    );

    // Create carries the alias-resolved first name.
    let create: serde_json::Value =
        serde_json::from_slice(requests[1].body.as_ref().unwrap()).unwrap();
    assert_eq!(create["properties"]["email"], "ann@x.com");
    assert_eq!(create["properties"]["firstname"], "Ann");
    assert_eq!(create["properties"]["hs_lead_status"], "NEW");
    assert_eq!(
        create["properties"]["recent_conversion_event_name"],
        "Contact Form"
    );
}

#[tokio::test]
async fn test_existing_contact_is_updated_not_created() {
    let transport = FakeTransport::new();
    transport.push_response(200, json!({"results": [{"id": "77"}]}));
    transport.push_response(200, json!({"id": "77"}));
    let adapter = HubspotAdapter::new(Arc::new(transport.clone()));

    let event = make_event(vec![("Email", FieldKind::Email, json!("ann@x.com"))]);
    let integration = hubspot_integration(IntegrationSettings::default());

    let receipt = adapter.push(&integration, &event).await.expect("push succeeds");
    assert_eq!(receipt.record_id.as_deref(), Some("77"));

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].method, crate::transport::HttpMethod::Patch);
    assert!(requests[1].url.ends_with("/crm/v3/objects/contacts/77"));
}

#[tokio::test]
async fn test_missing_email_is_hard_failure() {
    let transport = FakeTransport::new();
    let adapter = HubspotAdapter::new(Arc::new(transport.clone()));

    let event = make_event(vec![("Favorite color", FieldKind::ShortText, json!("teal"))]);
    let integration = hubspot_integration(IntegrationSettings::default());

    let error = adapter.push(&integration, &event).await.unwrap_err();
    assert!(matches!(error, ProviderError::MissingIdentity(_)));
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test]
async fn test_mapping_prefixes_route_to_contact_and_deal() {
    let transport = FakeTransport::new();
    transport.push_response(200, json!({"results": []}));
    transport.push_response(201, json!({"id": "301"}));
    transport.push_response(201, json!({"id": "deal-5"}));
    let adapter = HubspotAdapter::new(Arc::new(transport.clone()));

    let event = make_event(vec![
        ("Email", FieldKind::Email, json!("ann@x.com")),
        ("Budget", FieldKind::Number, json!("5000")),
        ("Role", FieldKind::ShortText, json!("CTO")),
    ]);
    let mut settings = IntegrationSettings::default();
    settings.field_mapping.insert(
        event.answers[1].field_id.to_string(),
        "deal.amount".to_string(),
    );
    settings.field_mapping.insert(
        event.answers[2].field_id.to_string(),
        "contact.jobtitle".to_string(),
    );
    let integration = hubspot_integration(settings);

    let receipt = adapter.push(&integration, &event).await.expect("push succeeds");

    let requests = transport.requests();
    assert_eq!(requests.len(), 3, "search, create contact, create deal");

    let contact: serde_json::Value =
        serde_json::from_slice(requests[1].body.as_ref().unwrap()).unwrap();
    assert_eq!(contact["properties"]["jobtitle"], "CTO");
    assert!(contact["properties"].get("amount").is_none());

    let deal: serde_json::Value =
        serde_json::from_slice(requests[2].body.as_ref().unwrap()).unwrap();
    assert_eq!(deal["properties"]["amount"], "5000");
    assert_eq!(deal["properties"]["pipeline"], "default");
    assert_eq!(deal["properties"]["dealstage"], "appointmentscheduled");
    assert_eq!(deal["associations"][0]["to"]["id"], "301");

    assert!(receipt.detail.as_deref().unwrap().contains("deal-5"));
}

#[tokio::test]
async fn test_create_deal_flag_without_deal_properties() {
    let transport = FakeTransport::new();
    transport.push_response(200, json!({"results": []}));
    transport.push_response(201, json!({"id": "301"}));
    transport.push_response(201, json!({"id": "deal-9"}));
    let adapter = HubspotAdapter::new(Arc::new(transport.clone()));

    let event = make_event(vec![
        ("First Name", FieldKind::ShortText, json!("Ann")),
        ("Email", FieldKind::Email, json!("ann@x.com")),
    ]);
    let integration = hubspot_integration(IntegrationSettings {
        create_deal: true,
        ..Default::default()
    });

    adapter.push(&integration, &event).await.expect("push succeeds");

    let deal: serde_json::Value =
        serde_json::from_slice(transport.requests()[2].body.as_ref().unwrap()).unwrap();
    assert_eq!(deal["properties"]["dealname"], "Ann - Contact Form");
}

#[tokio::test]
async fn test_search_rejection_surfaces_verbatim_message() {
    let transport = FakeTransport::new();
    transport.push_response(401, json!({"message": "The access token is expired"}));
    let adapter = HubspotAdapter::new(Arc::new(transport));

    let event = make_event(vec![("Email", FieldKind::Email, json!("ann@x.com"))]);
    let integration = hubspot_integration(IntegrationSettings::default());

    let error = adapter.push(&integration, &event).await.unwrap_err();
    match error {
        ProviderError::Rejected { message, .. } => {
            assert_eq!(message, "The access token is expired");
        }
        other => panic!("expected Rejected, got {:?}", other),
    }
}

#[tokio::test]
async fn test_identity_check_reports_portal() {
    let transport = FakeTransport::new();
    transport.push_response(200, json!({"portalId": 424242, "accountType": "STANDARD"}));
    let adapter = HubspotAdapter::new(Arc::new(transport));

    let check = adapter
        .test_identity(&CredentialBundle::AccessToken {
            token: Secret::from_string("pat".to_string()),
        })
        .await;

    assert!(check.success);
    assert_eq!(check.identity.as_deref(), Some("portal 424242"));
}

#[tokio::test]
async fn test_discover_lists_deal_pipelines() {
    let transport = FakeTransport::new();
    transport.push_response(
        200,
        json!({"results": [{"id": "default", "label": "Sales Pipeline", "stages": []}]}),
    );
    let adapter = HubspotAdapter::new(Arc::new(transport));

    let containers = adapter
        .discover(
            &CredentialBundle::AccessToken {
                token: Secret::from_string("pat".to_string()),
            },
            None,
        )
        .await
        .expect("discovery succeeds");

    assert_eq!(containers.len(), 1);
    assert_eq!(containers[0].name, "Sales Pipeline");
    assert_eq!(containers[0].kind, "pipeline");
}
