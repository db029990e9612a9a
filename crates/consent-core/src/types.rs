//! Consent definitions, status projections and the typed records exchanged
//! with collaborators.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A consent definition from the catalog.
///
/// Two definitions are equal iff their ids match.
#[derive(Debug, Clone)]
pub struct Consent {
    /// Stable identifier.
    pub id: String,

    /// Display label, never empty.
    pub label: String,

    /// Display description, may be empty.
    pub description: String,

    /// Informational only; the engine does not enforce it.
    pub required: bool,

    /// Whether the consent governs disclosure of data fields.
    pub affects_fields: bool,

    /// Form-level widget references (empty unless `affects_fields`).
    pub form_fields: Vec<String>,

    /// Concrete data-field identifiers resolved from `form_fields`.
    pub data_fields: Vec<String>,
}

impl Consent {
    /// Create a consent that does not affect any fields.
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            description: String::new(),
            required: false,
            affects_fields: false,
            form_fields: Vec::new(),
            data_fields: Vec::new(),
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Mark the consent as required.
    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Attach form fields and their resolved data fields.
    pub fn with_fields(mut self, form_fields: Vec<String>, data_fields: Vec<String>) -> Self {
        self.affects_fields = true;
        self.form_fields = form_fields;
        self.data_fields = data_fields;
        self
    }
}

impl PartialEq for Consent {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Consent {}

impl Hash for Consent {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Whether a subject has granted a consent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConsentStatus {
    Granted,
    NotGranted,
    /// Not projected against any subject.
    #[default]
    Unknown,
}

impl ConsentStatus {
    /// Wire value (`"YES"`/`"NO"`); `None` for [`ConsentStatus::Unknown`].
    pub fn as_wire(&self) -> Option<&'static str> {
        match self {
            Self::Granted => Some("YES"),
            Self::NotGranted => Some("NO"),
            Self::Unknown => None,
        }
    }

    /// Parse a wire value. Anything other than `"YES"`/`"NO"` is unknown.
    pub fn from_wire(value: Option<&str>) -> Self {
        match value {
            Some("YES") => Self::Granted,
            Some("NO") => Self::NotGranted,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ConsentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Granted => write!(f, "granted"),
            Self::NotGranted => write!(f, "not_granted"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A catalog definition projected against one subject.
///
/// Shares the definition with the catalog snapshot instead of copying it.
#[derive(Debug, Clone)]
pub struct ConsentView {
    pub consent: Arc<Consent>,
    pub status: ConsentStatus,
}

impl ConsentView {
    pub fn new(consent: Arc<Consent>, status: ConsentStatus) -> Self {
        Self { consent, status }
    }

    /// View of a bare definition (status [`ConsentStatus::Unknown`]).
    pub fn unprojected(consent: Arc<Consent>) -> Self {
        Self::new(consent, ConsentStatus::Unknown)
    }

    pub fn id(&self) -> &str {
        &self.consent.id
    }

    pub fn is_granted(&self) -> bool {
        self.status == ConsentStatus::Granted
    }
}

impl PartialEq for ConsentView {
    fn eq(&self, other: &Self) -> bool {
        self.consent.id == other.consent.id && self.status == other.status
    }
}

impl Eq for ConsentView {}

/// Raw consent definition as stored by the configuration source.
///
/// Integer flags follow the storage convention: exactly `1` is true.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub id: String,

    #[serde(default)]
    pub required: i64,

    #[serde(default, rename = "affectsFields", alias = "affects_fields")]
    pub affects_fields: i64,

    /// Form-level widget references.
    #[serde(default, rename = "fields", alias = "form_fields")]
    pub form_fields: Vec<String>,

    /// Raw label text, before rendering.
    #[serde(default)]
    pub label: Option<String>,

    /// Raw description text, before rendering.
    #[serde(default)]
    pub description: Option<String>,
}

impl ConsentRecord {
    pub fn is_required(&self) -> bool {
        self.required == 1
    }

    pub fn affects_fields(&self) -> bool {
        self.affects_fields == 1
    }
}

/// Display properties the configuration source can render for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayProperty {
    Label,
    Description,
}

impl DisplayProperty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Label => "label",
            Self::Description => "description",
        }
    }
}

/// A UI widget registered under an extension point.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Widget {
    /// Widget identifier (matches form-field references).
    pub id: String,

    /// Extension point the widget is registered under.
    #[serde(default)]
    pub extension_point: String,

    /// Free-form widget parameters (`enabled`, `fields`, ...).
    #[serde(default)]
    pub parameters: HashMap<String, String>,
}

impl Widget {
    pub fn new(id: impl Into<String>, extension_point: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            extension_point: extension_point.into(),
            parameters: HashMap::new(),
        }
    }

    /// Set a parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}
