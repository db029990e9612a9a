//! Per-subject grant records.
//!
//! Grants are never cached across calls. Every mutation goes through a
//! [`GrantTransaction`] that re-reads the subject's record, applies the
//! change in memory and writes the whole list back. There is no
//! optimistic-concurrency check: two transactions on the same subject race
//! and the last commit wins.

use std::sync::Arc;

use tracing::debug;

use crate::error::{ConsentError, ConsentResult};
use crate::source::GrantStorage;

/// Ordered set of granted consent ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantSet {
    ids: Vec<String>,
}

impl GrantSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from ids, keeping the first occurrence of each.
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::new();
        for id in ids {
            set.insert(id);
        }
        set
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|g| g == id)
    }

    /// Add an id; returns false if it was already present.
    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        if self.contains(&id) {
            return false;
        }
        self.ids.push(id);
        true
    }

    /// Remove an id; returns false if it was absent.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.ids.len();
        self.ids.retain(|g| g != id);
        self.ids.len() != before
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Reads and writes subjects' granted consent ids.
#[derive(Clone)]
pub struct ConsentGrantStore {
    storage: Arc<dyn GrantStorage>,
}

impl ConsentGrantStore {
    pub fn new(storage: Arc<dyn GrantStorage>) -> Self {
        Self { storage }
    }

    /// Granted ids of a subject; `None` if the subject has no record.
    pub async fn load(&self, subject: &str) -> ConsentResult<Option<GrantSet>> {
        Ok(self
            .storage
            .load_granted_ids(subject)
            .await?
            .map(GrantSet::from_ids))
    }

    /// Start a load-mutate-save unit of work on a subject's grants.
    pub async fn begin(&self, subject: &str) -> ConsentResult<GrantTransaction<'_>> {
        let grants = self
            .load(subject)
            .await?
            .ok_or_else(|| ConsentError::UnknownSubject {
                subject: subject.to_string(),
            })?;
        Ok(GrantTransaction {
            store: self,
            subject: subject.to_string(),
            grants,
            dirty: false,
        })
    }
}

/// A subject's grants loaded for modification.
///
/// Nothing is written until [`GrantTransaction::commit`]; dropping the
/// transaction discards the changes.
pub struct GrantTransaction<'a> {
    store: &'a ConsentGrantStore,
    subject: String,
    grants: GrantSet,
    dirty: bool,
}

impl GrantTransaction<'_> {
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn grants(&self) -> &GrantSet {
        &self.grants
    }

    pub fn grant(&mut self, id: &str) -> bool {
        let changed = self.grants.insert(id);
        self.dirty |= changed;
        changed
    }

    pub fn revoke(&mut self, id: &str) -> bool {
        let changed = self.grants.remove(id);
        self.dirty |= changed;
        changed
    }

    /// Overwrite the grants with exactly `ids`.
    pub fn replace(&mut self, ids: GrantSet) {
        if ids != self.grants {
            self.grants = ids;
            self.dirty = true;
        }
    }

    /// Persist the grants if they changed.
    pub async fn commit(self) -> ConsentResult<()> {
        if !self.dirty {
            debug!(subject = %self.subject, "grants unchanged, nothing to save");
            return Ok(());
        }
        self.store
            .storage
            .save_granted_ids(&self.subject, self.grants.as_slice())
            .await?;
        debug!(subject = %self.subject, granted = self.grants.len(), "saved grants");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryGrantStorage;

    #[test]
    fn test_grant_set_is_ordered_and_unique() {
        let mut set = GrantSet::from_ids(["b", "a", "b"]);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["b", "a"]);
        assert!(!set.insert("a"));
        assert!(set.insert("c"));
        assert!(set.remove("b"));
        assert!(!set.remove("b"));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_load_unknown_subject() {
        let store = ConsentGrantStore::new(Arc::new(InMemoryGrantStorage::new()));
        assert!(store.load("nobody").await.unwrap().is_none());
        assert!(matches!(
            store.begin("nobody").await,
            Err(ConsentError::UnknownSubject { .. })
        ));
    }

    #[tokio::test]
    async fn test_transaction_commit() {
        let storage = Arc::new(InMemoryGrantStorage::new().with_subject("p1", &["a"]));
        let store = ConsentGrantStore::new(storage.clone());

        let mut tx = store.begin("p1").await.unwrap();
        assert!(tx.grant("b"));
        assert!(tx.revoke("a"));
        tx.commit().await.unwrap();

        assert_eq!(storage.granted("p1"), Some(vec!["b".to_string()]));
    }

    #[tokio::test]
    async fn test_unchanged_transaction_does_not_write() {
        let storage = Arc::new(InMemoryGrantStorage::new().with_subject("p1", &["a"]));
        let store = ConsentGrantStore::new(storage.clone());

        let mut tx = store.begin("p1").await.unwrap();
        assert!(!tx.grant("a"));
        assert!(!tx.revoke("zzz"));
        tx.commit().await.unwrap();

        assert_eq!(storage.saves(), 0);
    }

    #[tokio::test]
    async fn test_dropped_transaction_discards() {
        let storage = Arc::new(InMemoryGrantStorage::new().with_subject("p1", &[]));
        let store = ConsentGrantStore::new(storage.clone());

        {
            let mut tx = store.begin("p1").await.unwrap();
            tx.grant("a");
        }
        assert_eq!(storage.granted("p1"), Some(vec![]));
    }

    #[tokio::test]
    async fn test_each_transaction_rereads() {
        let storage = Arc::new(InMemoryGrantStorage::new().with_subject("p1", &[]));
        let store = ConsentGrantStore::new(storage.clone());

        store.begin("p1").await.unwrap();
        storage.add_subject("p1", &["external"]);
        let tx = store.begin("p1").await.unwrap();

        assert!(tx.grants().contains("external"));
        assert_eq!(storage.loads(), 2);
    }
}
