//! JSON wire format for consents.
//!
//! ```text
//! { "id": "...", "label": "...", "description": "...", "required": false,
//!   "status": "YES" | "NO",        // only for projected consents
//!   "fields": ["...", ...] }       // only if the consent affects fields
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::types::{Consent, ConsentStatus, ConsentView};

#[derive(Debug, Serialize, Deserialize)]
struct ConsentWire {
    id: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fields: Option<Vec<String>>,
}

impl From<&ConsentView> for ConsentWire {
    fn from(view: &ConsentView) -> Self {
        let consent = &view.consent;
        Self {
            id: consent.id.clone(),
            label: Some(consent.label.clone()),
            description: Some(consent.description.clone()),
            required: Some(consent.required),
            status: view.status.as_wire().map(String::from),
            fields: consent
                .affects_fields
                .then(|| consent.data_fields.clone()),
        }
    }
}

/// Serialize consents to a JSON array; `None` stays `None`.
pub fn to_json(consents: Option<&[ConsentView]>) -> Option<Value> {
    let consents = consents?;
    let entries = consents
        .iter()
        .map(|view| serde_json::to_value(ConsentWire::from(view)).unwrap_or(Value::Null))
        .collect();
    Some(Value::Array(entries))
}

/// Deserialize a JSON array of consents; `None`/`null` stays `None`.
///
/// Entries that are not well-formed consent objects are skipped, as are
/// repeated ids. A missing or empty label becomes `"<id> <empty_label_marker>"`.
pub fn from_json(value: Option<&Value>, empty_label_marker: &str) -> Option<Vec<ConsentView>> {
    let entries = match value? {
        Value::Null => return None,
        Value::Array(entries) => entries,
        other => {
            warn!(kind = %json_kind(other), "expected a JSON array of consents");
            return None;
        }
    };

    let mut seen = HashSet::new();
    let mut views = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let wire: ConsentWire = match serde_json::from_value(entry.clone()) {
            Ok(wire) => wire,
            Err(e) => {
                warn!(index, error = %e, "skipping malformed consent entry");
                continue;
            }
        };
        if wire.id.is_empty() || !seen.insert(wire.id.clone()) {
            warn!(index, consent_id = %wire.id, "skipping consent entry with empty or repeated id");
            continue;
        }
        views.push(view_from_wire(wire, empty_label_marker));
    }
    Some(views)
}

fn view_from_wire(wire: ConsentWire, empty_label_marker: &str) -> ConsentView {
    let label = match wire.label {
        Some(label) if !label.is_empty() => label,
        _ => format!("{} {}", wire.id, empty_label_marker),
    };
    let status = ConsentStatus::from_wire(wire.status.as_deref());
    let mut consent = Consent::new(wire.id, label)
        .with_description(wire.description.unwrap_or_default())
        .with_required(wire.required.unwrap_or_default());
    if let Some(fields) = wire.fields {
        consent = consent.with_fields(Vec::new(), fields);
    }
    ConsentView::new(Arc::new(consent), status)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
