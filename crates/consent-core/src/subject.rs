//! Per-subject consent projection.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::catalog::{CatalogSnapshot, SystemConsentCatalog};
use crate::grants::{ConsentGrantStore, GrantSet};
use crate::types::{ConsentStatus, ConsentView};

/// Projects the catalog against one subject's grants.
#[derive(Clone)]
pub struct SubjectConsentResolver {
    catalog: Arc<SystemConsentCatalog>,
    grants: ConsentGrantStore,
}

impl SubjectConsentResolver {
    pub fn new(catalog: Arc<SystemConsentCatalog>, grants: ConsentGrantStore) -> Self {
        Self { catalog, grants }
    }

    /// Consents of a subject, in catalog order.
    ///
    /// Ungranted definitions are always included as `NotGranted`; granted
    /// ones only when `include_granted` is set. Returns `None` when the
    /// subject has no record.
    pub async fn resolve(&self, subject: &str, include_granted: bool) -> Option<Vec<ConsentView>> {
        let granted = match self.grants.load(subject).await {
            Ok(Some(granted)) => granted,
            Ok(None) => {
                debug!(subject, "no record for subject");
                return None;
            }
            Err(e) => {
                warn!(subject, error = %e, "could not read consents for subject");
                GrantSet::new()
            }
        };

        let catalog = self.catalog.get_catalog().await;
        Some(project(&catalog, &granted, include_granted))
    }
}

/// Diff a catalog against a grant set.
pub fn project(catalog: &CatalogSnapshot, granted: &GrantSet, include_granted: bool) -> Vec<ConsentView> {
    catalog
        .iter()
        .filter_map(|consent| {
            if granted.contains(&consent.id) {
                include_granted.then(|| ConsentView::new(consent.clone(), ConsentStatus::Granted))
            } else {
                Some(ConsentView::new(consent.clone(), ConsentStatus::NotGranted))
            }
        })
        .collect()
}
