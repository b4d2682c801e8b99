//! Tests for submission events and outbound payload shapes

use super::*;
use crate::test_support::make_event;
use crate::EventType;
use serde_json::json;

#[test]
fn test_webhook_envelope_shape() {
    let event = make_event(vec![
        ("Name", FieldKind::ShortText, json!("Ann")),
        ("Email", FieldKind::Email, json!("ann@x.com")),
    ]);
    let sent_at = Timestamp::from_rfc3339("2024-05-01T00:00:00+00:00").unwrap();

    let envelope = event.webhook_envelope(EventType::SubmissionCreated, sent_at);

    assert_eq!(envelope["event"], "submission.created");
    assert_eq!(envelope["timestamp"], sent_at.to_rfc3339());
    assert_eq!(envelope["form"]["id"], event.form_id.to_string());
    assert_eq!(envelope["form"]["title"], "Contact Form");
    assert_eq!(envelope["form"]["publicId"], "pub123");
    assert_eq!(envelope["submission"]["id"], event.submission_id.to_string());
    assert_eq!(
        envelope["submission"]["completedAt"],
        event.completed_at.to_rfc3339()
    );

    let data = envelope["submission"]["data"]
        .as_object()
        .expect("data is an object");
    assert_eq!(data.len(), 2);
    assert_eq!(
        data[&event.answers[0].field_id.to_string()],
        json!("Ann")
    );
}

#[test]
fn test_hook_payload_flattens_answers() {
    let event = make_event(vec![("Email", FieldKind::Email, json!("ann@x.com"))]);
    let sent_at = Timestamp::now();

    let payload = event.hook_payload(EventType::SubmissionCreated, sent_at);

    let answers = payload["submission"]["answers"]
        .as_array()
        .expect("answers array present");
    assert_eq!(answers.len(), 1);
    assert_eq!(answers[0]["fieldId"], event.answers[0].field_id.to_string());
    assert_eq!(answers[0]["fieldLabel"], "Email");
    assert_eq!(answers[0]["fieldType"], "EMAIL");
    assert_eq!(answers[0]["value"], "ann@x.com");

    // Envelope fields are unchanged by the flattening.
    assert_eq!(payload["event"], "submission.created");
    assert_eq!(payload["form"]["publicId"], "pub123");
}

#[test]
fn test_sample_matches_hook_payload_shape() {
    let sample = SubmissionEvent::sample();
    let payload = sample.hook_payload(EventType::SubmissionCreated, Timestamp::now());

    for key in ["event", "timestamp", "form", "submission"] {
        assert!(payload.get(key).is_some(), "missing envelope key {}", key);
    }
    let answers = payload["submission"]["answers"].as_array().unwrap();
    assert_eq!(answers.len(), 3);
    for answer in answers {
        for key in ["fieldId", "fieldLabel", "fieldType", "value"] {
            assert!(answer.get(key).is_some(), "missing answer key {}", key);
        }
    }
}

#[test]
fn test_labeled_answers_falls_back_to_field_id() {
    let mut event = make_event(vec![("Name", FieldKind::ShortText, json!("Ann"))]);
    event.answers[0].label = String::new();

    let labeled = event.labeled_answers();
    assert!(labeled.contains_key(&event.answers[0].field_id.to_string()));
}

#[test]
fn test_field_answer_emptiness() {
    let event = make_event(vec![
        ("Empty", FieldKind::ShortText, json!("")),
        ("Null", FieldKind::ShortText, serde_json::Value::Null),
        ("NoChoices", FieldKind::Checkboxes, json!([])),
        ("Zero", FieldKind::Number, json!(0)),
        ("False", FieldKind::Checkboxes, json!(false)),
    ]);

    assert!(event.answers[0].is_empty());
    assert!(event.answers[1].is_empty());
    assert!(event.answers[2].is_empty());
    assert!(!event.answers[3].is_empty());
    assert!(!event.answers[4].is_empty());
}

#[test]
fn test_field_kind_wire_names() {
    assert_eq!(FieldKind::ShortText.as_str(), "SHORT_TEXT");
    let json = serde_json::to_string(&FieldKind::MultipleChoice).unwrap();
    assert_eq!(json, "\"MULTIPLE_CHOICE\"");
}
