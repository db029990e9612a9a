//! File-backed collaborators.
//!
//! # Layout
//!
//! ```text
//! consents.yaml        # consents: [{id, label, description, required, affectsFields, fields}]
//! widgets.yaml         # widgets:  [{id, extension_point, parameters: {fields, enabled}}]
//! grants/{subject}.json  # {"granted": ["consent_id", ...]}
//! ```
//!
//! Files are re-read on every call; the catalog does the caching.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{ConsentError, ConsentResult};
use crate::memory::distinct_extension_points;
use crate::source::{ConfigurationSource, FieldRegistry, GrantStorage};
use crate::types::{ConsentRecord, DisplayProperty, Widget};

/// Consent configuration stored as a YAML document.
#[derive(Debug, Clone)]
pub struct YamlConfigSource {
    path: PathBuf,
}

impl YamlConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigurationSource for YamlConfigSource {
    async fn last_modified(&self) -> ConsentResult<DateTime<Utc>> {
        let metadata = fs::metadata(&self.path)
            .await
            .map_err(|e| ConsentError::io(&self.path, e))?;
        let modified = metadata
            .modified()
            .map_err(|e| ConsentError::io(&self.path, e))?;
        Ok(DateTime::<Utc>::from(modified))
    }

    async fn list_records(&self) -> ConsentResult<Vec<ConsentResult<ConsentRecord>>> {
        let content = fs::read_to_string(&self.path)
            .await
            .map_err(|e| ConsentError::io(&self.path, e))?;
        let document: serde_yaml::Value =
            serde_yaml::from_str(&content).map_err(|e| ConsentError::unavailable(
                "configuration",
                format!("{} is not valid YAML: {}", self.path.display(), e),
            ))?;

        let entries = match document.get("consents") {
            Some(serde_yaml::Value::Sequence(entries)) => entries.clone(),
            Some(serde_yaml::Value::Null) | None => Vec::new(),
            Some(_) => {
                return Err(ConsentError::unavailable(
                    "configuration",
                    format!("{}: `consents` must be a list", self.path.display()),
                ))
            }
        };

        debug!(path = %self.path.display(), records = entries.len(), "read consent configuration");
        Ok(entries.into_iter().map(decode_record).collect())
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

fn decode_record(entry: serde_yaml::Value) -> ConsentResult<ConsentRecord> {
    let id = entry
        .get("id")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    serde_yaml::from_value(entry).map_err(|e| ConsentError::MalformedRecord {
        id,
        reason: e.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct WidgetDocument {
    #[serde(default)]
    widgets: Vec<Widget>,
}

/// Widget registry stored as a YAML document.
#[derive(Debug, Clone)]
pub struct YamlFieldRegistry {
    path: PathBuf,
}

impl YamlFieldRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn widgets(&self) -> ConsentResult<Vec<Widget>> {
        let content = fs::read_to_string(&self.path)
            .await
            .map_err(|e| ConsentError::io(&self.path, e))?;
        let document: WidgetDocument = serde_yaml::from_str(&content).map_err(|e| {
            ConsentError::unavailable(
                "field registry",
                format!("{} is not a valid widget list: {}", self.path.display(), e),
            )
        })?;
        Ok(document.widgets)
    }
}

#[async_trait]
impl FieldRegistry for YamlFieldRegistry {
    async fn find_extension_points(&self, widget_name: &str) -> ConsentResult<Vec<String>> {
        let widgets = self.widgets().await?;
        Ok(distinct_extension_points(&widgets, widget_name))
    }

    async fn list_widgets(&self, extension_point: &str) -> ConsentResult<Vec<Widget>> {
        Ok(self
            .widgets()
            .await?
            .into_iter()
            .filter(|w| w.extension_point == extension_point)
            .collect())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct GrantDocument {
    #[serde(default)]
    granted: Vec<serde_json::Value>,
}

/// Grant storage keeping one JSON document per subject.
#[derive(Debug, Clone)]
pub struct JsonFileGrantStorage {
    dir: PathBuf,
    create_missing_subjects: bool,
}

impl JsonFileGrantStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            create_missing_subjects: false,
        }
    }

    /// Treat subjects without a document as existing with no grants.
    pub fn with_create_missing_subjects(mut self, create: bool) -> Self {
        self.create_missing_subjects = create;
        self
    }

    /// Path of a subject's grant document.
    pub fn subject_path(&self, subject: &str) -> ConsentResult<PathBuf> {
        let valid = !subject.is_empty()
            && subject != "."
            && subject != ".."
            && !subject.contains(['/', '\\'])
            && !subject.contains('\0');
        if !valid {
            return Err(ConsentError::UnknownSubject {
                subject: subject.to_string(),
            });
        }
        Ok(self.dir.join(format!("{}.json", subject)))
    }
}

#[async_trait]
impl GrantStorage for JsonFileGrantStorage {
    async fn load_granted_ids(&self, subject: &str) -> ConsentResult<Option<Vec<String>>> {
        let path = self.subject_path(subject)?;
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(self.create_missing_subjects.then(Vec::new));
            }
            Err(e) => return Err(ConsentError::io(&path, e)),
        };

        let document: GrantDocument =
            serde_json::from_str(&content).map_err(|e| ConsentError::MalformedRecord {
                id: subject.to_string(),
                reason: format!("invalid grant document: {}", e),
            })?;

        let mut ids = Vec::with_capacity(document.granted.len());
        for entry in document.granted {
            match entry {
                serde_json::Value::String(id) => ids.push(id),
                other => warn!(subject, entry = %other, "skipping malformed grant entry"),
            }
        }
        Ok(Some(ids))
    }

    async fn save_granted_ids(&self, subject: &str, ids: &[String]) -> ConsentResult<()> {
        let path = self.subject_path(subject)?;
        let persistence = |message: String| ConsentError::Persistence {
            subject: subject.to_string(),
            message,
        };

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| persistence(format!("failed to create grants directory: {}", e)))?;

        let document = GrantDocument {
            granted: ids.iter().cloned().map(serde_json::Value::String).collect(),
        };
        let json = serde_json::to_string_pretty(&document)
            .map_err(|e| persistence(format!("failed to serialize grants: {}", e)))?;

        // Each save gets its own temp file so concurrent writers only race on the rename.
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || write_atomic(&dir, &path, json.as_bytes()))
            .await
            .map_err(|e| persistence(format!("write task failed: {}", e)))?
            .map_err(persistence)?;

        debug!(subject, granted = ids.len(), "wrote grant document");
        Ok(())
    }
}

/// Write `content` to a fresh temp file in `dir`, then rename it over `path`.
fn write_atomic(dir: &Path, path: &Path, content: &[u8]) -> Result<(), String> {
    let mut temp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| format!("failed to create temp file: {}", e))?;
    temp.write_all(content)
        .and_then(|()| temp.as_file().sync_all())
        .map_err(|e| format!("failed to write temp file: {}", e))?;
    temp.persist(path)
        .map_err(|e| format!("failed to rename temp file: {}", e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CONSENTS_YAML: &str = r#"
consents:
  - id: real_consent
    label: "<p>Real</p>"
    description: Shares identifying data
    required: 1
    affectsFields: 0
  - id: genetic
    label: Genetic
    affectsFields: 1
    fields: [genes_widget]
  - id: broken
    required: "always"
"#;

    const WIDGETS_YAML: &str = r#"
widgets:
  - id: genes_widget
    extension_point: patient.sections
    parameters:
      fields: "genes, rejectedGenes"
  - id: hidden
    extension_point: patient.sections
    parameters:
      enabled: "false"
      fields: secret
"#;

    #[tokio::test]
    async fn test_yaml_source_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("consents.yaml");
        std::fs::write(&path, CONSENTS_YAML).unwrap();

        let source = YamlConfigSource::new(&path);
        let records = source.list_records().await.unwrap();
        assert_eq!(records.len(), 3);

        let first = records[0].as_ref().unwrap();
        assert!(first.is_required());
        assert_eq!(first.label.as_deref(), Some("<p>Real</p>"));

        let second = records[1].as_ref().unwrap();
        assert!(second.affects_fields());
        assert_eq!(second.form_fields, vec!["genes_widget"]);

        match &records[2] {
            Err(ConsentError::MalformedRecord { id, .. }) => assert_eq!(id, "broken"),
            other => panic!("expected malformed record, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_yaml_source_missing_file() {
        let dir = TempDir::new().unwrap();
        let source = YamlConfigSource::new(dir.path().join("absent.yaml"));
        assert!(matches!(
            source.last_modified().await,
            Err(ConsentError::Io { .. })
        ));
        assert!(source.list_records().await.is_err());
    }

    #[tokio::test]
    async fn test_yaml_source_empty_document() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("consents.yaml");
        std::fs::write(&path, "consents:\n").unwrap();

        let source = YamlConfigSource::new(&path);
        assert!(source.list_records().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_yaml_registry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("widgets.yaml");
        std::fs::write(&path, WIDGETS_YAML).unwrap();

        let registry = YamlFieldRegistry::new(&path);
        assert_eq!(
            registry.find_extension_points("genes_widget").await.unwrap(),
            vec!["patient.sections"]
        );
        assert!(registry.find_extension_points("nope").await.unwrap().is_empty());
        assert_eq!(registry.list_widgets("patient.sections").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_grant_storage_roundtrip() {
        let dir = TempDir::new().unwrap();
        let storage = JsonFileGrantStorage::new(dir.path().join("grants"));

        assert_eq!(storage.load_granted_ids("p1").await.unwrap(), None);

        storage
            .save_granted_ids("p1", &["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(
            storage.load_granted_ids("p1").await.unwrap(),
            Some(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_saves_leave_a_whole_document() {
        let dir = TempDir::new().unwrap();
        let storage = std::sync::Arc::new(JsonFileGrantStorage::new(dir.path()));

        for round in 0..20 {
            let handles: Vec<_> = (0..8)
                .map(|writer| {
                    let storage = storage.clone();
                    tokio::spawn(async move {
                        let ids = vec![format!("r{}", round), format!("w{}", writer)];
                        storage.save_granted_ids("p1", &ids).await
                    })
                })
                .collect();
            for handle in handles {
                handle.await.unwrap().unwrap();
            }

            let ids = storage.load_granted_ids("p1").await.unwrap().unwrap();
            assert_eq!(ids.len(), 2);
            assert_eq!(ids[0], format!("r{}", round));
        }

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("p1.json")]);
    }

    #[tokio::test]
    async fn test_grant_storage_create_missing() {
        let dir = TempDir::new().unwrap();
        let storage = JsonFileGrantStorage::new(dir.path()).with_create_missing_subjects(true);
        assert_eq!(storage.load_granted_ids("p1").await.unwrap(), Some(vec![]));
    }

    #[tokio::test]
    async fn test_grant_storage_skips_bad_entries() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("p1.json"),
            r#"{"granted": ["a", 7, null, "b"]}"#,
        )
        .unwrap();

        let storage = JsonFileGrantStorage::new(dir.path());
        assert_eq!(
            storage.load_granted_ids("p1").await.unwrap(),
            Some(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[tokio::test]
    async fn test_grant_storage_rejects_path_subjects() {
        let dir = TempDir::new().unwrap();
        let storage = JsonFileGrantStorage::new(dir.path());
        assert!(matches!(
            storage.load_granted_ids("../etc/passwd").await,
            Err(ConsentError::UnknownSubject { .. })
        ));
        assert!(storage.subject_path("").is_err());
    }
}
