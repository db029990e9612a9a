use clap::builder::BoolishValueParser;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "consent",
    version,
    about = "Query and change subject consents against a cached consent catalog"
)]
pub struct Cli {
    #[command(flatten)]
    pub engine: EngineArgs,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

/// Engine settings; each falls back to its `CONSENT_*` environment variable.
#[derive(Args, Debug, Default)]
pub struct EngineArgs {
    /// Consent configuration YAML
    #[arg(long, global = true, env = "CONSENT_CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Widget registry YAML
    #[arg(long, global = true, env = "CONSENT_REGISTRY_PATH")]
    pub registry: Option<PathBuf>,

    /// Directory of per-subject grant documents
    #[arg(long, global = true, env = "CONSENT_GRANTS_DIR")]
    pub grants_dir: Option<PathBuf>,

    /// Suffix for fallback labels
    #[arg(long, global = true, env = "CONSENT_EMPTY_LABEL_MARKER")]
    pub empty_label_marker: Option<String>,

    /// Treat subjects without a grant document as having no grants
    /// (`--create-missing-subjects=false` overrides the environment)
    #[arg(
        long,
        global = true,
        env = "CONSENT_CREATE_MISSING_SUBJECTS",
        value_name = "BOOL",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub create_missing_subjects: Option<bool>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the consent catalog as JSON
    Catalog(CatalogArgs),
    /// Print consents the subject has not granted
    Missing(SubjectArgs),
    /// Print every consent with the subject's status
    All(SubjectArgs),
    /// Grant a consent to a subject
    Grant(SubjectConsentArgs),
    /// Revoke a consent from a subject
    Revoke(SubjectConsentArgs),
    /// Check whether a subject granted a consent
    Has(SubjectConsentArgs),
    /// Overwrite a subject's grants with the given consent ids
    Set(SetArgs),
    /// Check a consent id against the catalog
    Validate(ValidateArgs),
}

#[derive(Args, Debug)]
pub struct CatalogArgs {
    /// Also list configuration records that were skipped
    #[arg(long)]
    pub show_skipped: bool,
}

#[derive(Args, Debug)]
pub struct SubjectArgs {
    pub subject: String,
}

#[derive(Args, Debug)]
pub struct SubjectConsentArgs {
    pub subject: String,
    pub consent_id: String,
}

#[derive(Args, Debug)]
pub struct SetArgs {
    pub subject: String,
    /// Consent ids; unknown ids are dropped
    pub consent_ids: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    pub consent_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_missing_subjects_flag_forms() {
        let parse = |args: &[&str]| {
            Cli::try_parse_from(args)
                .unwrap()
                .engine
                .create_missing_subjects
        };
        assert_eq!(parse(&["consent", "--create-missing-subjects", "missing", "P1"]), Some(true));
        assert_eq!(parse(&["consent", "--create-missing-subjects=false", "missing", "P1"]), Some(false));
        assert_eq!(parse(&["consent", "missing", "P1", "--create-missing-subjects=yes"]), Some(true));
    }
}
