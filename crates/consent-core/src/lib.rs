//! Consent resolution and caching engine.
//!
//! This crate keeps a catalog of consent definitions and answers which of
//! them a subject has granted, providing:
//!
//! - A cached system catalog, rebuilt only when the configuration source changes
//! - Resolution of form widgets to the data fields a consent covers
//! - Missing/all projections of the catalog against a subject's grants
//! - Grant, revoke and replace operations on a subject's grant record
//! - A JSON wire format for projected consents
//!
//! # Quick Start
//!
//! ```no_run
//! use consent_core::{ConsentManager, EngineConfig};
//!
//! # async fn example() -> consent_core::ConsentResult<()> {
//! let manager = ConsentManager::from_config(&EngineConfig::from_env())?;
//!
//! if let Some(missing) = manager.get_missing_consents_for_patient("P000123").await {
//!     for view in &missing {
//!         println!("{} is not granted", view.id());
//!     }
//! }
//! manager.grant_consent("P000123", "share_genomics").await;
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `CONSENT_CONFIG_PATH` | Consent configuration YAML |
//! | `CONSENT_REGISTRY_PATH` | Widget registry YAML |
//! | `CONSENT_GRANTS_DIR` | Directory of per-subject grant documents |
//! | `CONSENT_EMPTY_LABEL_MARKER` | Suffix for fallback labels (default: `(no label)`) |
//! | `CONSENT_CREATE_MISSING_SUBJECTS` | Treat subjects without a grant document as having none |

pub mod catalog;
pub mod config;
mod display;
pub mod error;
pub mod fields;
pub mod files;
pub mod grants;
pub mod json;
pub mod manager;
pub mod memory;
pub mod source;
pub mod subject;
pub mod types;

// Re-export main types
pub use catalog::{CatalogSnapshot, RecordOutcome, SystemConsentCatalog};
pub use config::{EngineConfig, DEFAULT_EMPTY_LABEL_MARKER};
pub use display::clean_display_text;
pub use error::{ConsentError, ConsentResult};
pub use fields::{split_fields, FieldDependencyResolver, FieldOutcome, FieldResolution};
pub use files::{JsonFileGrantStorage, YamlConfigSource, YamlFieldRegistry};
pub use grants::{ConsentGrantStore, GrantSet, GrantTransaction};
pub use manager::ConsentManager;
pub use memory::{InMemoryConfigSource, InMemoryFieldRegistry, InMemoryGrantStorage};
pub use source::{ConfigurationSource, FieldRegistry, GrantStorage};
pub use subject::{project, SubjectConsentResolver};
pub use types::{Consent, ConsentRecord, ConsentStatus, ConsentView, DisplayProperty, Widget};
