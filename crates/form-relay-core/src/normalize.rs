//! # Field Normalization
//!
//! Converts a submission's raw per-field answers into the key/value and type
//! shape a specific destination expects, applying per-destination field
//! mapping and, where no mapping exists, heuristic identity detection.
//!
//! Individual unmapped or malformed fields are skipped silently; only a
//! missing destination-required identity field is a hard failure, surfaced
//! as [`NormalizeError::MissingIdentity`].

use crate::submission::FieldAnswer;
use crate::Timestamp;
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex is valid")
});

// ============================================================================
// Target Types
// ============================================================================

/// Declared type of a destination field, pulled from the provider's live
/// schema when available
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Text,
    Number,
    Boolean,
    Date,
    DateTime,
    Select,
    MultiSelect,
    Rating,
    Attachment,
    Email,
    Phone,
    Url,
}

// ============================================================================
// Errors
// ============================================================================

/// Hard normalization failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum NormalizeError {
    #[error("no {field} field could be resolved from the submission")]
    MissingIdentity { field: String },
}

// ============================================================================
// Normalization
// ============================================================================

/// Normalize answers into destination-field-keyed, type-coerced values
///
/// A value is included only when a mapping entry exists with a non-empty
/// target and the answer carries a usable value. When `schema` supplies a
/// [`TargetType`] for the target field, the value is coerced; coercion
/// failures drop the field rather than erroring.
pub fn normalize(
    answers: &[FieldAnswer],
    mapping: &HashMap<String, String>,
    schema: Option<&HashMap<String, TargetType>>,
) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();

    for answer in answers {
        let Some(target) = mapping.get(&answer.field_id.to_string()) else {
            continue;
        };
        if target.is_empty() || answer.is_empty() {
            continue;
        }

        let coerced = match schema.and_then(|s| s.get(target)) {
            Some(target_type) => coerce(*target_type, &answer.value),
            None => Some(answer.value.clone()),
        };

        if let Some(value) = coerced {
            out.insert(target.clone(), value);
        }
    }

    out
}

/// Coerce one value to a destination field type
///
/// Returns `None` when the value cannot be represented (e.g. an unparseable
/// date); the caller drops the field.
pub fn coerce(target: TargetType, value: &Value) -> Option<Value> {
    match target {
        TargetType::Text | TargetType::Select | TargetType::Phone | TargetType::Url => {
            Some(Value::String(value_to_string(value)))
        }
        TargetType::Email => Some(Value::String(value_to_string(value).to_lowercase())),
        TargetType::Number => Some(json!(parse_number(value))),
        TargetType::Boolean => Some(Value::Bool(truthy(value))),
        TargetType::Date => parse_timestamp(value).map(|ts| Value::String(ts.date_string())),
        TargetType::DateTime => parse_timestamp(value).map(|ts| Value::String(ts.to_rfc3339())),
        TargetType::MultiSelect => {
            let items = match value {
                Value::Array(items) => items.iter().map(value_to_string).collect(),
                other => vec![value_to_string(other)],
            };
            Some(json!(items))
        }
        TargetType::Rating => {
            let rating = parse_number(value).round() as i64;
            Some(json!(rating.clamp(1, 5)))
        }
        TargetType::Attachment => {
            let urls: Vec<Value> = match value {
                Value::Array(items) => items
                    .iter()
                    .map(|item| json!({ "url": value_to_string(item) }))
                    .collect(),
                other => vec![json!({ "url": value_to_string(other) })],
            };
            Some(Value::Array(urls))
        }
    }
}

/// Render any JSON value as display text; arrays are comma-joined
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(value_to_string)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Parse a numeric value, falling back to `0` on failure
pub fn parse_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        Value::Bool(true) => 1.0,
        _ => 0.0,
    }
}

/// JavaScript-style truthiness: null, empty string, `0` and `false` are falsy
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn parse_timestamp(value: &Value) -> Option<Timestamp> {
    let text = match value {
        Value::String(s) => s.trim(),
        _ => return None,
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(Timestamp::from_datetime(dt.with_timezone(&Utc)));
    }

    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        let dt = date.and_hms_opt(0, 0, 0)?.and_utc();
        return Some(Timestamp::from_datetime(dt));
    }

    None
}

// ============================================================================
// Identity Heuristics
// ============================================================================

/// Substring alias table mapping form field labels to canonical identity
/// fields
///
/// The table is policy, not architecture: [`AliasTable::standard`] carries
/// the product defaults, and callers may construct their own.
#[derive(Debug, Clone)]
pub struct AliasTable {
    entries: Vec<(&'static str, Vec<&'static str>)>,
}

impl AliasTable {
    /// The default alias table used by contact-sync destinations
    pub fn standard() -> Self {
        Self {
            entries: vec![
                ("firstname", vec!["first_name", "first", "fname", "name"]),
                ("lastname", vec!["last_name", "last", "lname", "surname"]),
                ("phone", vec!["phone", "phone_number", "tel", "mobile"]),
                ("company", vec!["company", "company_name", "organization"]),
                ("jobtitle", vec!["job_title", "title", "position", "role"]),
                ("website", vec!["website", "url", "site"]),
                ("address", vec!["address", "street"]),
                ("city", vec!["city"]),
                ("state", vec!["state", "province"]),
                ("zip", vec!["zip", "zipcode", "postal_code"]),
            ],
        }
    }

    /// Resolve canonical identity fields from answer labels and field ids
    ///
    /// Matching is case-insensitive substring containment; the first match
    /// per canonical field wins. Empty answers never match.
    pub fn resolve(&self, answers: &[FieldAnswer]) -> BTreeMap<&'static str, Value> {
        let mut out: BTreeMap<&'static str, Value> = BTreeMap::new();

        for answer in answers {
            if answer.is_empty() {
                continue;
            }
            let label = answer.label.to_lowercase();
            let field_id = answer.field_id.to_string().to_lowercase();

            for (canonical, aliases) in &self.entries {
                if out.contains_key(canonical) {
                    continue;
                }
                if aliases
                    .iter()
                    .any(|alias| label.contains(alias) || field_id.contains(alias))
                {
                    out.insert(canonical, answer.value.clone());
                    break;
                }
            }
        }

        out
    }
}

/// Detect an email answer without any mapping
///
/// Checks, in order: declared email field kind, an "email"-like label, and
/// finally a regex match on the value itself.
pub fn detect_email(answers: &[FieldAnswer]) -> Option<String> {
    for answer in answers {
        if answer.is_empty() {
            continue;
        }
        if answer.kind == crate::submission::FieldKind::Email {
            return Some(value_to_string(&answer.value));
        }
    }

    for answer in answers {
        if answer.is_empty() {
            continue;
        }
        if answer.label.to_lowercase().contains("email") {
            return Some(value_to_string(&answer.value));
        }
    }

    for answer in answers {
        let text = value_to_string(&answer.value);
        if EMAIL_RE.is_match(&text) {
            return Some(text);
        }
    }

    None
}

/// Resolve the email identity field: explicit mapping first, heuristics second
pub fn resolve_email(answers: &[FieldAnswer], mapping: &HashMap<String, String>) -> Option<String> {
    for answer in answers {
        if answer.is_empty() {
            continue;
        }
        if mapping
            .get(&answer.field_id.to_string())
            .map(|target| target == "email")
            .unwrap_or(false)
        {
            return Some(value_to_string(&answer.value));
        }
    }

    detect_email(answers)
}

#[cfg(test)]
#[path = "normalize_tests.rs"]
mod tests;
