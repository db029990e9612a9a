//! Engine configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ConsentError, ConsentResult};

/// Default suffix appended to a consent id when its label renders empty.
pub const DEFAULT_EMPTY_LABEL_MARKER: &str = "(no label)";

/// Consent engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// YAML document holding consent definitions.
    #[serde(default)]
    pub config_path: Option<PathBuf>,

    /// YAML document listing form widgets.
    #[serde(default)]
    pub registry_path: Option<PathBuf>,

    /// Directory holding one grant document per subject.
    #[serde(default)]
    pub grants_dir: Option<PathBuf>,

    /// Marker used to build a fallback label (`"<id> <marker>"`).
    #[serde(default = "default_empty_label_marker")]
    pub empty_label_marker: String,

    /// Treat subjects without a grant document as existing with no grants.
    #[serde(default)]
    pub create_missing_subjects: bool,
}

fn default_empty_label_marker() -> String {
    DEFAULT_EMPTY_LABEL_MARKER.to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            config_path: None,
            registry_path: None,
            grants_dir: None,
            empty_label_marker: default_empty_label_marker(),
            create_missing_subjects: false,
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `CONSENT_CONFIG_PATH` | Consent configuration YAML |
    /// | `CONSENT_REGISTRY_PATH` | Widget registry YAML |
    /// | `CONSENT_GRANTS_DIR` | Grant documents directory |
    /// | `CONSENT_EMPTY_LABEL_MARKER` | Fallback label marker |
    /// | `CONSENT_CREATE_MISSING_SUBJECTS` | Accept subjects without a grant document |
    pub fn from_env() -> Self {
        Self {
            config_path: std::env::var("CONSENT_CONFIG_PATH").ok().map(PathBuf::from),
            registry_path: std::env::var("CONSENT_REGISTRY_PATH").ok().map(PathBuf::from),
            grants_dir: std::env::var("CONSENT_GRANTS_DIR").ok().map(PathBuf::from),
            empty_label_marker: std::env::var("CONSENT_EMPTY_LABEL_MARKER")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(default_empty_label_marker),
            create_missing_subjects: std::env::var("CONSENT_CREATE_MISSING_SUBJECTS")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }

    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn with_registry_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.registry_path = Some(path.into());
        self
    }

    pub fn with_grants_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.grants_dir = Some(dir.into());
        self
    }

    pub fn with_empty_label_marker(mut self, marker: impl Into<String>) -> Self {
        self.empty_label_marker = marker.into();
        self
    }

    pub fn with_create_missing_subjects(mut self, create: bool) -> Self {
        self.create_missing_subjects = create;
        self
    }

    /// Paths required by the file-backed collaborators.
    pub fn require_paths(&self) -> ConsentResult<(PathBuf, PathBuf, PathBuf)> {
        let missing = |name: &str| ConsentError::Config {
            message: format!("{} is not set", name),
        };
        Ok((
            self.config_path
                .clone()
                .ok_or_else(|| missing("CONSENT_CONFIG_PATH"))?,
            self.registry_path
                .clone()
                .ok_or_else(|| missing("CONSENT_REGISTRY_PATH"))?,
            self.grants_dir
                .clone()
                .ok_or_else(|| missing("CONSENT_GRANTS_DIR"))?,
        ))
    }
}
