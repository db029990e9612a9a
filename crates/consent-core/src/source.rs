//! Collaborator boundaries.
//!
//! The engine never talks to storage directly. Catalog configuration, the
//! widget registry and per-subject grant records are reached through the
//! traits below; every record is decoded into typed values here, once.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ConsentResult;
use crate::types::{ConsentRecord, DisplayProperty, Widget};

/// The document holding consent definitions.
#[async_trait]
pub trait ConfigurationSource: Send + Sync {
    /// Last-modified time of the configuration document.
    async fn last_modified(&self) -> ConsentResult<DateTime<Utc>>;

    /// All consent definition records, in document order.
    ///
    /// The outer error means the document itself could not be read. Inner
    /// errors mark single records that failed to decode; siblings are still
    /// usable.
    async fn list_records(&self) -> ConsentResult<Vec<ConsentResult<ConsentRecord>>>;

    /// Rendered display text of one record property.
    async fn render_display(
        &self,
        record: &ConsentRecord,
        property: DisplayProperty,
    ) -> ConsentResult<Option<String>>;
}

/// Registry of form widgets grouped by extension point.
#[async_trait]
pub trait FieldRegistry: Send + Sync {
    /// Distinct extension points that have a widget named `widget_name`.
    async fn find_extension_points(&self, widget_name: &str) -> ConsentResult<Vec<String>>;

    /// Widgets registered under an extension point.
    async fn list_widgets(&self, extension_point: &str) -> ConsentResult<Vec<Widget>>;
}

/// Per-subject grant records.
#[async_trait]
pub trait GrantStorage: Send + Sync {
    /// Granted consent ids of a subject.
    ///
    /// `Ok(None)` means the subject has no record at all; `Ok(Some(vec![]))`
    /// means the subject exists and has granted nothing.
    async fn load_granted_ids(&self, subject: &str) -> ConsentResult<Option<Vec<String>>>;

    /// Replace the granted consent ids of a subject.
    async fn save_granted_ids(&self, subject: &str, ids: &[String]) -> ConsentResult<()>;
}
