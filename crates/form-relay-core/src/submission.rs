//! # Submission Events
//!
//! The immutable snapshot of a completed submission handed to the engine,
//! plus the two outbound payload shapes built from it: the signed webhook
//! envelope and the REST-hook trigger payload.

use crate::{AccountId, FieldId, FormId, SubmissionId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

// ============================================================================
// Field Answers
// ============================================================================

/// Coarse field type of a form field, as stored by the form builder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldKind {
    ShortText,
    LongText,
    Email,
    Phone,
    Number,
    Date,
    Dropdown,
    MultipleChoice,
    Checkboxes,
    Rating,
    FileUpload,
    Url,
}

impl FieldKind {
    /// Get wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ShortText => "SHORT_TEXT",
            Self::LongText => "LONG_TEXT",
            Self::Email => "EMAIL",
            Self::Phone => "PHONE",
            Self::Number => "NUMBER",
            Self::Date => "DATE",
            Self::Dropdown => "DROPDOWN",
            Self::MultipleChoice => "MULTIPLE_CHOICE",
            Self::Checkboxes => "CHECKBOXES",
            Self::Rating => "RATING",
            Self::FileUpload => "FILE_UPLOAD",
            Self::Url => "URL",
        }
    }
}

/// One answered field within a submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldAnswer {
    pub field_id: FieldId,
    pub label: String,
    pub kind: FieldKind,
    pub value: Value,
}

impl FieldAnswer {
    /// Create new field answer
    pub fn new(field_id: FieldId, label: impl Into<String>, kind: FieldKind, value: Value) -> Self {
        Self {
            field_id,
            label: label.into(),
            kind,
            value,
        }
    }

    /// Check whether the answer carries no usable value
    ///
    /// Empty strings and empty arrays count as absent; `0` and `false` do not.
    pub fn is_empty(&self) -> bool {
        match &self.value {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::Array(a) => a.is_empty(),
            _ => false,
        }
    }
}

// ============================================================================
// Submission Event
// ============================================================================

/// Immutable snapshot of a completed submission, owned by the orchestrator
/// for the duration of one dispatch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionEvent {
    pub submission_id: SubmissionId,
    pub form_id: FormId,
    pub form_title: String,
    pub form_public_id: String,
    pub account_id: AccountId,
    pub answers: Vec<FieldAnswer>,
    pub completed_at: Timestamp,
}

impl SubmissionEvent {
    /// Answer values keyed by field ID string
    pub fn data_by_field_id(&self) -> BTreeMap<String, Value> {
        self.answers
            .iter()
            .map(|a| (a.field_id.to_string(), a.value.clone()))
            .collect()
    }

    /// Answer values keyed by field label
    ///
    /// Falls back to the field ID when a label is missing. Later duplicate
    /// labels overwrite earlier ones, matching the map the notification
    /// adapters render from.
    pub fn labeled_answers(&self) -> BTreeMap<String, Value> {
        self.answers
            .iter()
            .map(|a| {
                let key = if a.label.is_empty() {
                    a.field_id.to_string()
                } else {
                    a.label.clone()
                };
                (key, a.value.clone())
            })
            .collect()
    }

    /// Build the signed webhook delivery envelope
    ///
    /// Wire shape:
    /// `{ event, timestamp, form: {id, title, publicId},
    ///    submission: {id, data, completedAt} }`
    pub fn webhook_envelope(&self, event: crate::EventType, sent_at: Timestamp) -> Value {
        json!({
            "event": event.as_str(),
            "timestamp": sent_at.to_rfc3339(),
            "form": {
                "id": self.form_id.to_string(),
                "title": self.form_title,
                "publicId": self.form_public_id,
            },
            "submission": {
                "id": self.submission_id.to_string(),
                "data": self.data_by_field_id(),
                "completedAt": self.completed_at.to_rfc3339(),
            },
        })
    }

    /// Build the REST-hook trigger payload
    ///
    /// Same envelope as [`Self::webhook_envelope`] with the answers
    /// additionally flattened into `{fieldId, fieldLabel, fieldType, value}`
    /// tuples for consumer convenience.
    pub fn hook_payload(&self, event: crate::EventType, sent_at: Timestamp) -> Value {
        let mut payload = self.webhook_envelope(event, sent_at);
        let answers: Vec<Value> = self
            .answers
            .iter()
            .map(|a| {
                json!({
                    "fieldId": a.field_id.to_string(),
                    "fieldLabel": a.label,
                    "fieldType": a.kind.as_str(),
                    "value": a.value,
                })
            })
            .collect();
        payload["submission"]["answers"] = Value::Array(answers);
        payload
    }

    /// Representative sample event used by automation platforms during setup
    pub fn sample() -> Self {
        Self {
            submission_id: SubmissionId::new(),
            form_id: FormId::new(),
            form_title: "Contact Form".to_string(),
            form_public_id: "abc123xyz".to_string(),
            account_id: AccountId::new(),
            answers: vec![
                FieldAnswer::new(FieldId::new(), "Name", FieldKind::ShortText, json!("John Doe")),
                FieldAnswer::new(
                    FieldId::new(),
                    "Email",
                    FieldKind::Email,
                    json!("john@example.com"),
                ),
                FieldAnswer::new(
                    FieldId::new(),
                    "Message",
                    FieldKind::LongText,
                    json!("Hello, this is a test message!"),
                ),
            ],
            completed_at: Timestamp::now(),
        }
    }
}

#[cfg(test)]
#[path = "submission_tests.rs"]
mod tests;
