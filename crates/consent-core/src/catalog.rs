//! System consent catalog.
//!
//! Caches the full set of consent definitions built from the configuration
//! source. Every read asks the source for its last-modified time and
//! rebuilds only when that time is strictly newer than the version of the
//! cached snapshot.
//!
//! Snapshots are immutable and published with a single pointer swap, so a
//! reader always gets either the previous or the new snapshot, never a
//! partially built one. Rebuilds are serialized behind an async mutex;
//! readers never wait on it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::DEFAULT_EMPTY_LABEL_MARKER;
use crate::display::{clean_display_text, label_or_fallback};
use crate::error::{ConsentError, ConsentResult};
use crate::fields::FieldDependencyResolver;
use crate::source::{ConfigurationSource, FieldRegistry};
use crate::types::{Consent, ConsentRecord, DisplayProperty};

/// Immutable set of consent definitions plus the source version it was built from.
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    consents: Vec<Arc<Consent>>,
    index: HashMap<String, usize>,
    source_version: Option<DateTime<Utc>>,
}

impl CatalogSnapshot {
    /// Snapshot with no definitions and no version (never built).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a snapshot; later duplicates of an id are dropped.
    pub fn new(consents: Vec<Consent>, source_version: Option<DateTime<Utc>>) -> Self {
        let mut snapshot = Self {
            consents: Vec::with_capacity(consents.len()),
            index: HashMap::with_capacity(consents.len()),
            source_version,
        };
        for consent in consents {
            snapshot.insert(consent);
        }
        snapshot
    }

    fn insert(&mut self, consent: Consent) -> bool {
        if self.index.contains_key(&consent.id) {
            return false;
        }
        self.index.insert(consent.id.clone(), self.consents.len());
        self.consents.push(Arc::new(consent));
        true
    }

    /// Definitions in build order.
    pub fn consents(&self) -> &[Arc<Consent>] {
        &self.consents
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Consent>> {
        self.consents.iter()
    }

    /// Exact, case-sensitive id lookup.
    pub fn get(&self, id: &str) -> Option<&Arc<Consent>> {
        self.index.get(id).map(|&i| &self.consents[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.consents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consents.is_empty()
    }

    /// Last-modified time of the source document this snapshot was built from.
    pub fn source_version(&self) -> Option<DateTime<Utc>> {
        self.source_version
    }
}

/// What happened to one configuration record during a rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Built { id: String },
    Skipped { id: String, reason: String },
}

/// Cached, self-refreshing consent catalog.
pub struct SystemConsentCatalog {
    source: Arc<dyn ConfigurationSource>,
    fields: FieldDependencyResolver,
    empty_label_marker: String,
    current: RwLock<Arc<CatalogSnapshot>>,
    rebuild_lock: tokio::sync::Mutex<()>,
    /// Pending invalidation generation; 0 when none is pending.
    invalidation: AtomicU64,
    rebuilds: AtomicUsize,
    last_outcomes: Mutex<Vec<RecordOutcome>>,
}

impl SystemConsentCatalog {
    pub fn new(source: Arc<dyn ConfigurationSource>, registry: Arc<dyn FieldRegistry>) -> Self {
        Self {
            source,
            fields: FieldDependencyResolver::new(registry),
            empty_label_marker: DEFAULT_EMPTY_LABEL_MARKER.to_string(),
            current: RwLock::new(Arc::new(CatalogSnapshot::empty())),
            rebuild_lock: tokio::sync::Mutex::new(()),
            invalidation: AtomicU64::new(0),
            rebuilds: AtomicUsize::new(0),
            last_outcomes: Mutex::new(Vec::new()),
        }
    }

    /// Set the marker used for fallback labels.
    pub fn with_empty_label_marker(mut self, marker: impl Into<String>) -> Self {
        self.empty_label_marker = marker.into();
        self
    }

    /// Currently published snapshot, without consulting the source.
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Current catalog, rebuilt first if the source has changed.
    ///
    /// Never fails: if the source cannot be read, the previous snapshot
    /// (possibly empty) is returned.
    pub async fn get_catalog(&self) -> Arc<CatalogSnapshot> {
        let cached = self.snapshot();

        let modified = match self.source.last_modified().await {
            Ok(modified) => modified,
            Err(e) => {
                warn!(error = %e, "could not read consent configuration, serving cached catalog");
                return cached;
            }
        };

        if !self.is_stale(&cached, modified) {
            return cached;
        }

        let _guard = self.rebuild_lock.lock().await;

        // A rebuild that finished while we waited may already cover `modified`.
        let latest = self.snapshot();
        if !self.is_stale(&latest, modified) {
            debug!("catalog refreshed by concurrent rebuild");
            return latest;
        }

        match self.rebuild(modified).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "could not rebuild consent catalog, keeping previous snapshot");
                latest
            }
        }
    }

    /// Force the next read to rebuild regardless of the source timestamp.
    pub fn invalidate(&self) {
        self.invalidation.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of snapshots published so far.
    pub fn rebuilds(&self) -> usize {
        self.rebuilds.load(Ordering::SeqCst)
    }

    /// Per-record outcomes of the most recent successful rebuild.
    pub fn last_outcomes(&self) -> Vec<RecordOutcome> {
        self.last_outcomes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn is_stale(&self, snapshot: &CatalogSnapshot, modified: DateTime<Utc>) -> bool {
        if self.invalidation.load(Ordering::SeqCst) != 0 {
            return true;
        }
        match snapshot.source_version() {
            None => true,
            Some(version) => modified > version,
        }
    }

    /// Build and publish a new snapshot. Must run under `rebuild_lock`.
    async fn rebuild(&self, modified: DateTime<Utc>) -> ConsentResult<Arc<CatalogSnapshot>> {
        let generation = self.invalidation.load(Ordering::SeqCst);
        let records = self.source.list_records().await?;

        let mut snapshot = CatalogSnapshot::new(Vec::new(), Some(modified));
        let mut outcomes = Vec::with_capacity(records.len());

        for record in records {
            let outcome = match record {
                Ok(record) => match self.build_consent(&record).await {
                    Ok(consent) => {
                        let id = consent.id.clone();
                        if snapshot.insert(consent) {
                            RecordOutcome::Built { id }
                        } else {
                            RecordOutcome::Skipped {
                                id,
                                reason: "duplicate consent id".to_string(),
                            }
                        }
                    }
                    Err(e) => RecordOutcome::Skipped {
                        id: record.id.clone(),
                        reason: e.to_string(),
                    },
                },
                Err(e) => RecordOutcome::Skipped {
                    id: match &e {
                        ConsentError::MalformedRecord { id, .. } => id.clone(),
                        _ => String::new(),
                    },
                    reason: e.to_string(),
                },
            };
            if let RecordOutcome::Skipped { id, reason } = &outcome {
                warn!(consent_id = %id, reason = %reason, "consent is improperly configured, skipping");
            }
            outcomes.push(outcome);
        }

        let skipped = outcomes
            .iter()
            .filter(|o| matches!(o, RecordOutcome::Skipped { .. }))
            .count();
        info!(
            built = snapshot.len(),
            skipped,
            version = %modified,
            "rebuilt consent catalog"
        );

        let snapshot = Arc::new(snapshot);
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = snapshot.clone();
        // An invalidate() that landed while listing stays pending.
        let _ = self
            .invalidation
            .compare_exchange(generation, 0, Ordering::SeqCst, Ordering::SeqCst);
        self.rebuilds.fetch_add(1, Ordering::SeqCst);
        *self.last_outcomes.lock().unwrap_or_else(|e| e.into_inner()) = outcomes;

        Ok(snapshot)
    }

    async fn build_consent(&self, record: &ConsentRecord) -> ConsentResult<Consent> {
        if record.id.trim().is_empty() {
            return Err(ConsentError::MalformedRecord {
                id: record.id.clone(),
                reason: "missing id".to_string(),
            });
        }

        let label = self
            .source
            .render_display(record, DisplayProperty::Label)
            .await?;
        let label = label_or_fallback(&record.id, label.as_deref(), &self.empty_label_marker);

        let description = self
            .source
            .render_display(record, DisplayProperty::Description)
            .await?
            .map(|d| clean_display_text(&d, false))
            .unwrap_or_default();

        let consent = Consent::new(record.id.clone(), label)
            .with_description(description)
            .with_required(record.is_required());

        if !record.affects_fields() {
            return Ok(consent);
        }

        let resolution = self.fields.resolve(&record.form_fields).await;
        if resolution.skipped() > 0 {
            debug!(
                consent_id = %record.id,
                skipped = resolution.skipped(),
                "some form fields did not resolve"
            );
        }
        Ok(consent.with_fields(record.form_fields.clone(), resolution.data_fields()))
    }
}
