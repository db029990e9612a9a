//! Consent manager facade.
//!
//! Ties the catalog, the per-subject resolver and the grant store together
//! behind boolean/empty-result contracts. Collaborator failures are logged
//! here and never returned to the caller.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogSnapshot, SystemConsentCatalog};
use crate::config::{EngineConfig, DEFAULT_EMPTY_LABEL_MARKER};
use crate::error::{ConsentError, ConsentResult};
use crate::files::{JsonFileGrantStorage, YamlConfigSource, YamlFieldRegistry};
use crate::grants::{ConsentGrantStore, GrantSet, GrantTransaction};
use crate::json;
use crate::source::{ConfigurationSource, FieldRegistry, GrantStorage};
use crate::subject::SubjectConsentResolver;
use crate::types::ConsentView;

/// Entry point for consent queries and grant changes.
///
/// Cheap to clone; clones share the same cached catalog.
#[derive(Clone)]
pub struct ConsentManager {
    catalog: Arc<SystemConsentCatalog>,
    resolver: SubjectConsentResolver,
    grants: ConsentGrantStore,
    empty_label_marker: Arc<str>,
}

impl ConsentManager {
    pub fn new(
        source: Arc<dyn ConfigurationSource>,
        registry: Arc<dyn FieldRegistry>,
        storage: Arc<dyn GrantStorage>,
    ) -> Self {
        Self::with_empty_label_marker(source, registry, storage, DEFAULT_EMPTY_LABEL_MARKER)
    }

    /// Like [`ConsentManager::new`] with a custom fallback label marker.
    pub fn with_empty_label_marker(
        source: Arc<dyn ConfigurationSource>,
        registry: Arc<dyn FieldRegistry>,
        storage: Arc<dyn GrantStorage>,
        marker: impl Into<String>,
    ) -> Self {
        let marker: String = marker.into();
        let catalog = Arc::new(
            SystemConsentCatalog::new(source, registry).with_empty_label_marker(marker.clone()),
        );
        let grants = ConsentGrantStore::new(storage);
        Self {
            resolver: SubjectConsentResolver::new(catalog.clone(), grants.clone()),
            catalog,
            grants,
            empty_label_marker: marker.into(),
        }
    }

    /// Build a manager over the file-backed collaborators.
    pub fn from_config(config: &EngineConfig) -> ConsentResult<Self> {
        let (config_path, registry_path, grants_dir) = config.require_paths()?;
        info!(
            config = %config_path.display(),
            registry = %registry_path.display(),
            grants = %grants_dir.display(),
            "opening consent engine"
        );
        let storage = JsonFileGrantStorage::new(grants_dir)
            .with_create_missing_subjects(config.create_missing_subjects);
        Ok(Self::with_empty_label_marker(
            Arc::new(YamlConfigSource::new(config_path)),
            Arc::new(YamlFieldRegistry::new(registry_path)),
            Arc::new(storage),
            config.empty_label_marker.clone(),
        ))
    }

    /// Underlying catalog, for diagnostics.
    pub fn catalog(&self) -> &SystemConsentCatalog {
        &self.catalog
    }

    /// All consent definitions; the last good set if the source is down.
    pub async fn get_system_consents(&self) -> Arc<CatalogSnapshot> {
        self.catalog.get_catalog().await
    }

    pub async fn is_valid_consent_id(&self, id: &str) -> bool {
        self.catalog.get_catalog().await.contains(id)
    }

    /// Consents the subject has not granted; `None` for an unknown subject.
    pub async fn get_missing_consents_for_patient(&self, subject: &str) -> Option<Vec<ConsentView>> {
        self.resolver.resolve(subject, false).await
    }

    /// Every consent with the subject's status; `None` for an unknown subject.
    pub async fn get_all_consents_for_patient(&self, subject: &str) -> Option<Vec<ConsentView>> {
        self.resolver.resolve(subject, true).await
    }

    /// Replace the subject's grants with the known ids among `ids`.
    ///
    /// Unknown ids are dropped, order is kept and repeats are ignored.
    pub async fn set_patient_consents<S: AsRef<str>>(&self, subject: &str, ids: &[S]) -> bool {
        let catalog = self.catalog.get_catalog().await;
        let mut filtered = GrantSet::new();
        for id in ids.iter().map(AsRef::as_ref) {
            if catalog.contains(id) {
                filtered.insert(id);
            } else {
                debug!(subject, consent_id = id, "dropping unknown consent id");
            }
        }

        let result: ConsentResult<()> = async {
            let mut tx = self.grants.begin(subject).await?;
            tx.replace(filtered);
            tx.commit().await
        }
        .await;
        report(subject, "set", result)
    }

    /// Whether the subject granted `id`; false for unknown ids or subjects.
    pub async fn has_consent(&self, subject: &str, id: &str) -> bool {
        if !self.is_valid_consent_id(id).await {
            return false;
        }
        match self.get_missing_consents_for_patient(subject).await {
            Some(missing) => !missing.iter().any(|v| v.id() == id),
            None => false,
        }
    }

    pub async fn grant_consent(&self, subject: &str, id: &str) -> bool {
        self.update(subject, id, "grant", |tx, id| {
            tx.grant(id);
        })
        .await
    }

    pub async fn revoke_consent(&self, subject: &str, id: &str) -> bool {
        self.update(subject, id, "revoke", |tx, id| {
            tx.revoke(id);
        })
        .await
    }

    async fn update<F>(&self, subject: &str, id: &str, action: &'static str, apply: F) -> bool
    where
        F: FnOnce(&mut GrantTransaction<'_>, &str),
    {
        if !self.is_valid_consent_id(id).await {
            return report(
                subject,
                action,
                Err(ConsentError::UnknownConsent { id: id.to_string() }),
            );
        }

        let result: ConsentResult<()> = async {
            let mut tx = self.grants.begin(subject).await?;
            apply(&mut tx, id);
            tx.commit().await
        }
        .await;
        report(subject, action, result)
    }

    /// Force a catalog rebuild and return the fresh snapshot.
    pub async fn refresh_catalog(&self) -> Arc<CatalogSnapshot> {
        self.catalog.invalidate();
        self.catalog.get_catalog().await
    }

    pub fn to_json(&self, consents: Option<&[ConsentView]>) -> Option<Value> {
        json::to_json(consents)
    }

    pub fn from_json(&self, value: Option<&Value>) -> Option<Vec<ConsentView>> {
        json::from_json(value, &self.empty_label_marker)
    }
}

fn report(subject: &str, action: &'static str, result: ConsentResult<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e @ (ConsentError::UnknownConsent { .. } | ConsentError::UnknownSubject { .. })) => {
            debug!(subject, action, reason = %e, "consent change rejected");
            false
        }
        Err(e) => {
            warn!(subject, action, error = %e, "consent change failed");
            false
        }
    }
}
