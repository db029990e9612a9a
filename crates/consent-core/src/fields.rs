//! Field dependency resolution.
//!
//! A consent names form-level widgets; the data fields those widgets expose
//! are found in two hops through the field registry:
//!
//! 1. widget name → extension point (first match wins, ambiguity is logged)
//! 2. extension point → widgets → the enabled widget with that name → its
//!    comma-separated `fields` parameter
//!
//! A failing reference is reported and skipped; the remaining references
//! are still resolved.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::ConsentResult;
use crate::source::FieldRegistry;
use crate::types::Widget;

/// Widget parameter listing the data fields it exposes.
pub const PARAM_FIELDS: &str = "fields";

/// Widget parameter that disables a widget when set to `"false"`.
pub const PARAM_ENABLED: &str = "enabled";

/// Resolution result for one form-field reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldOutcome {
    Resolved {
        reference: String,
        fields: Vec<String>,
    },
    Skipped {
        reference: String,
        reason: String,
    },
}

impl FieldOutcome {
    pub fn reference(&self) -> &str {
        match self {
            Self::Resolved { reference, .. } | Self::Skipped { reference, .. } => reference,
        }
    }
}

/// Outcomes for a list of form-field references, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldResolution {
    pub outcomes: Vec<FieldOutcome>,
}

impl FieldResolution {
    /// Flattened data fields, in reference order.
    pub fn data_fields(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                FieldOutcome::Resolved { fields, .. } => Some(fields.iter().cloned()),
                FieldOutcome::Skipped { .. } => None,
            })
            .flatten()
            .collect()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, FieldOutcome::Skipped { .. }))
            .count()
    }
}

/// Maps form-field references to concrete data-field identifiers.
#[derive(Clone)]
pub struct FieldDependencyResolver {
    registry: Arc<dyn FieldRegistry>,
}

impl FieldDependencyResolver {
    pub fn new(registry: Arc<dyn FieldRegistry>) -> Self {
        Self { registry }
    }

    /// Resolve every reference, never failing as a whole.
    pub async fn resolve(&self, form_fields: &[String]) -> FieldResolution {
        let mut outcomes = Vec::with_capacity(form_fields.len());
        for reference in form_fields {
            let outcome = match self.resolve_one(reference).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(reference = %reference, error = %e, "field lookup failed, skipping");
                    FieldOutcome::Skipped {
                        reference: reference.clone(),
                        reason: e.to_string(),
                    }
                }
            };
            outcomes.push(outcome);
        }
        FieldResolution { outcomes }
    }

    /// Convenience wrapper returning only the data fields.
    pub async fn resolve_data_fields(&self, form_fields: &[String]) -> Vec<String> {
        self.resolve(form_fields).await.data_fields()
    }

    async fn resolve_one(&self, reference: &str) -> ConsentResult<FieldOutcome> {
        let points = self.registry.find_extension_points(reference).await?;
        let extension_point = match points.as_slice() {
            [] => {
                debug!(reference, "no extension point for widget");
                return Ok(FieldOutcome::Skipped {
                    reference: reference.to_string(),
                    reason: "no extension point".to_string(),
                });
            }
            [only] => only,
            [first, ..] => {
                warn!(
                    reference,
                    count = points.len(),
                    using = %first,
                    "widget is registered under several extension points"
                );
                first
            }
        };

        let widgets = self.registry.list_widgets(extension_point).await?;
        let fields: Vec<String> = widgets
            .iter()
            .filter(|w| w.id == reference)
            .filter_map(exposed_fields)
            .flatten()
            .collect();

        debug!(reference, extension_point = %extension_point, fields = fields.len(), "resolved widget");
        Ok(FieldOutcome::Resolved {
            reference: reference.to_string(),
            fields,
        })
    }
}

/// Fields declared by an enabled widget, or `None` if it exposes none.
fn exposed_fields(widget: &Widget) -> Option<Vec<String>> {
    if widget.parameters.get(PARAM_ENABLED).map(String::as_str) == Some("false") {
        return None;
    }
    let raw = widget.parameters.get(PARAM_FIELDS)?;
    Some(split_fields(raw))
}

/// Split a comma-separated field list, trimming each token.
pub fn split_fields(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
