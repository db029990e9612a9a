//! In-memory collaborators.
//!
//! Thread-safe implementations of the collaborator traits that keep their
//! state in process, count calls, and can be switched into a failing mode.
//! Used by the test suites and by embedders that assemble a catalog in code.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{ConsentError, ConsentResult};
use crate::source::{ConfigurationSource, FieldRegistry, GrantStorage};
use crate::types::{ConsentRecord, DisplayProperty, Widget};

#[derive(Debug, Clone)]
enum StoredRecord {
    Valid(ConsentRecord),
    Malformed { id: String, reason: String },
}

#[derive(Debug)]
struct ConfigState {
    last_modified: DateTime<Utc>,
    records: Vec<StoredRecord>,
    list_delay: Option<Duration>,
}

/// Configuration source backed by a list of records.
#[derive(Debug)]
pub struct InMemoryConfigSource {
    state: RwLock<ConfigState>,
    unavailable: AtomicBool,
    listing_unavailable: AtomicBool,
    last_modified_calls: AtomicUsize,
    list_calls: AtomicUsize,
}

impl InMemoryConfigSource {
    pub fn new(last_modified: DateTime<Utc>) -> Self {
        Self {
            state: RwLock::new(ConfigState {
                last_modified,
                records: Vec::new(),
                list_delay: None,
            }),
            unavailable: AtomicBool::new(false),
            listing_unavailable: AtomicBool::new(false),
            last_modified_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
        }
    }

    /// Add a record (builder style).
    pub fn with_record(self, record: ConsentRecord) -> Self {
        self.push_record(record);
        self
    }

    pub fn push_record(&self, record: ConsentRecord) {
        self.write().records.push(StoredRecord::Valid(record));
    }

    /// Add a record that fails to decode.
    pub fn push_malformed(&self, id: impl Into<String>, reason: impl Into<String>) {
        self.write().records.push(StoredRecord::Malformed {
            id: id.into(),
            reason: reason.into(),
        });
    }

    /// Replace all records without touching the last-modified time.
    pub fn set_records(&self, records: Vec<ConsentRecord>) {
        self.write().records = records.into_iter().map(StoredRecord::Valid).collect();
    }

    pub fn set_last_modified(&self, last_modified: DateTime<Utc>) {
        self.write().last_modified = last_modified;
    }

    /// Advance the last-modified time by one second.
    pub fn touch(&self) {
        let mut state = self.write();
        state.last_modified += chrono::Duration::seconds(1);
    }

    /// Delay applied to every `list_records` call.
    pub fn set_list_delay(&self, delay: Option<Duration>) {
        self.write().list_delay = delay;
    }

    /// Make every call fail with [`ConsentError::SourceUnavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make only `list_records` fail; the timestamp stays readable.
    pub fn set_listing_unavailable(&self, unavailable: bool) {
        self.listing_unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn last_modified_calls(&self) -> usize {
        self.last_modified_calls.load(Ordering::SeqCst)
    }

    /// Number of `list_records` calls, i.e. catalog rebuild attempts.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, ConfigState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, ConfigState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn check_available(&self) -> ConsentResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ConsentError::unavailable(
                "configuration",
                "in-memory source marked unavailable",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ConfigurationSource for InMemoryConfigSource {
    async fn last_modified(&self) -> ConsentResult<DateTime<Utc>> {
        self.last_modified_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.read().last_modified)
    }

    async fn list_records(&self) -> ConsentResult<Vec<ConsentResult<ConsentRecord>>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        if self.listing_unavailable.load(Ordering::SeqCst) {
            return Err(ConsentError::unavailable(
                "configuration",
                "consent records could not be listed",
            ));
        }

        let (records, delay) = {
            let state = self.read();
            (state.records.clone(), state.list_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        Ok(records
            .into_iter()
            .map(|r| match r {
                StoredRecord::Valid(record) => Ok(record),
                StoredRecord::Malformed { id, reason } => {
                    Err(ConsentError::MalformedRecord { id, reason })
                }
            })
            .collect())
    }

    async fn render_display(
        &self,
        record: &ConsentRecord,
        property: DisplayProperty,
    ) -> ConsentResult<Option<String>> {
        Ok(match property {
            DisplayProperty::Label => record.label.clone(),
            DisplayProperty::Description => record.description.clone(),
        })
    }
}

/// Widget registry backed by a list of widgets.
#[derive(Debug, Default)]
pub struct InMemoryFieldRegistry {
    widgets: RwLock<Vec<Widget>>,
    failing_lookups: RwLock<Vec<String>>,
    unavailable: AtomicBool,
    lookups: AtomicUsize,
}

impl InMemoryFieldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_widget(self, widget: Widget) -> Self {
        self.push_widget(widget);
        self
    }

    pub fn push_widget(&self, widget: Widget) {
        self.widgets
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(widget);
    }

    /// Make the extension point lookup fail for one widget name.
    pub fn fail_lookup_for(&self, widget_name: impl Into<String>) {
        self.failing_lookups
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(widget_name.into());
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of extension point lookups performed.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> ConsentResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ConsentError::unavailable(
                "field registry",
                "in-memory registry marked unavailable",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl FieldRegistry for InMemoryFieldRegistry {
    async fn find_extension_points(&self, widget_name: &str) -> ConsentResult<Vec<String>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let failing = self
            .failing_lookups
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|n| n == widget_name);
        if failing {
            return Err(ConsentError::unavailable(
                "field registry",
                format!("lookup failed for {}", widget_name),
            ));
        }

        let widgets = self.widgets.read().unwrap_or_else(|e| e.into_inner());
        Ok(distinct_extension_points(&widgets, widget_name))
    }

    async fn list_widgets(&self, extension_point: &str) -> ConsentResult<Vec<Widget>> {
        self.check_available()?;
        let widgets = self.widgets.read().unwrap_or_else(|e| e.into_inner());
        Ok(widgets
            .iter()
            .filter(|w| w.extension_point == extension_point)
            .cloned()
            .collect())
    }
}

/// Distinct extension points of widgets named `widget_name`, first-seen order.
pub(crate) fn distinct_extension_points(widgets: &[Widget], widget_name: &str) -> Vec<String> {
    let mut points: Vec<String> = Vec::new();
    for widget in widgets.iter().filter(|w| w.id == widget_name) {
        if !points.contains(&widget.extension_point) {
            points.push(widget.extension_point.clone());
        }
    }
    points
}

/// Grant storage backed by a map of subject id to granted ids.
#[derive(Debug, Default)]
pub struct InMemoryGrantStorage {
    subjects: RwLock<HashMap<String, Vec<String>>>,
    fail_loads: AtomicBool,
    fail_saves: AtomicBool,
    loads: AtomicUsize,
    saves: AtomicUsize,
}

impl InMemoryGrantStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subject with initial grants (builder style).
    pub fn with_subject(self, subject: impl Into<String>, granted: &[&str]) -> Self {
        self.add_subject(subject, granted);
        self
    }

    pub fn add_subject(&self, subject: impl Into<String>, granted: &[&str]) {
        self.subjects
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(subject.into(), granted.iter().map(|s| s.to_string()).collect());
    }

    /// Stored grants of a subject, bypassing the trait.
    pub fn granted(&self, subject: &str) -> Option<Vec<String>> {
        self.subjects
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(subject)
            .cloned()
    }

    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GrantStorage for InMemoryGrantStorage {
    async fn load_granted_ids(&self, subject: &str) -> ConsentResult<Option<Vec<String>>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(ConsentError::unavailable(
                "grant storage",
                format!("could not load grants for {}", subject),
            ));
        }
        Ok(self.granted(subject))
    }

    async fn save_granted_ids(&self, subject: &str, ids: &[String]) -> ConsentResult<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(ConsentError::Persistence {
                subject: subject.to_string(),
                message: "in-memory storage rejects writes".to_string(),
            });
        }
        self.subjects
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(subject.to_string(), ids.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_config_source_counts_calls() {
        let source = InMemoryConfigSource::new(Utc::now()).with_record(ConsentRecord {
            id: "a".to_string(),
            ..Default::default()
        });
        source.push_malformed("b", "bad flag");

        let records = source.list_records().await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].is_ok());
        assert!(matches!(
            records[1],
            Err(ConsentError::MalformedRecord { .. })
        ));
        assert_eq!(source.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_config_source_touch_advances() {
        let start = Utc::now();
        let source = InMemoryConfigSource::new(start);
        source.touch();
        assert!(source.last_modified().await.unwrap() > start);
    }

    #[tokio::test]
    async fn test_registry_distinct_points() {
        let registry = InMemoryFieldRegistry::new()
            .with_widget(Widget::new("w", "ep.a"))
            .with_widget(Widget::new("w", "ep.a"))
            .with_widget(Widget::new("w", "ep.b"))
            .with_widget(Widget::new("other", "ep.c"));

        let points = registry.find_extension_points("w").await.unwrap();
        assert_eq!(points, vec!["ep.a", "ep.b"]);
        assert_eq!(registry.list_widgets("ep.c").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_grant_storage_unknown_subject() {
        let storage = InMemoryGrantStorage::new().with_subject("p1", &["a"]);
        assert_eq!(
            storage.load_granted_ids("p1").await.unwrap(),
            Some(vec!["a".to_string()])
        );
        assert_eq!(storage.load_granted_ids("p2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_grant_storage_failing_save_keeps_state() {
        let storage = InMemoryGrantStorage::new().with_subject("p1", &["a"]);
        storage.set_fail_saves(true);
        let err = storage
            .save_granted_ids("p1", &["b".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, ConsentError::Persistence { .. }));
        assert_eq!(storage.granted("p1"), Some(vec!["a".to_string()]));
    }
}
