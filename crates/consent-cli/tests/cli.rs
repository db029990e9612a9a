use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const CONSENTS_YAML: &str = r#"
consents:
  - id: share_history
    label: Share medical history
    required: 1
  - id: share_genomics
    label: Share genomic results
    affectsFields: 1
    fields: [genotype_widget]
"#;

const WIDGETS_YAML: &str = r#"
widgets:
  - id: genotype_widget
    extension_point: patient.sections
    parameters:
      fields: genes
"#;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("consents.yaml"), CONSENTS_YAML).unwrap();
        std::fs::write(dir.path().join("widgets.yaml"), WIDGETS_YAML).unwrap();
        std::fs::create_dir(dir.path().join("grants")).unwrap();
        std::fs::write(dir.path().join("grants/P1.json"), r#"{"granted": []}"#).unwrap();
        Self { dir }
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("consent").unwrap();
        for var in [
            "CONSENT_CONFIG_PATH",
            "CONSENT_REGISTRY_PATH",
            "CONSENT_GRANTS_DIR",
            "CONSENT_EMPTY_LABEL_MARKER",
            "CONSENT_CREATE_MISSING_SUBJECTS",
        ] {
            cmd.env_remove(var);
        }
        cmd.env("RUST_LOG", "off")
            .arg("--config")
            .arg(self.dir.path().join("consents.yaml"))
            .arg("--registry")
            .arg(self.dir.path().join("widgets.yaml"))
            .arg("--grants-dir")
            .arg(self.dir.path().join("grants"));
        cmd
    }
}

#[test]
fn test_catalog_prints_json() {
    let ws = Workspace::new();
    let output = ws.cmd().arg("catalog").output().unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value.as_array().unwrap().len(), 2);
    assert_eq!(value[1]["fields"], serde_json::json!(["genes"]));
    assert!(value[0].get("status").is_none());
}

#[test]
fn test_grant_then_has() {
    let ws = Workspace::new();

    ws.cmd()
        .args(["has", "P1", "share_history"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("false"));

    ws.cmd()
        .args(["grant", "P1", "share_history"])
        .assert()
        .success()
        .stdout(predicate::str::contains("true"));

    ws.cmd()
        .args(["has", "P1", "share_history"])
        .assert()
        .success();

    ws.cmd()
        .args(["revoke", "P1", "share_history"])
        .assert()
        .success();

    ws.cmd()
        .args(["has", "P1", "share_history"])
        .assert()
        .code(1);
}

#[test]
fn test_set_drops_unknown_ids() {
    let ws = Workspace::new();

    ws.cmd()
        .args(["set", "P1", "share_genomics", "bogus"])
        .assert()
        .success();

    let stored = std::fs::read_to_string(ws.dir.path().join("grants/P1.json")).unwrap();
    let stored: serde_json::Value = serde_json::from_str(&stored).unwrap();
    assert_eq!(stored, serde_json::json!({ "granted": ["share_genomics"] }));
}

#[test]
fn test_unknown_subject_prints_null() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["missing", "nobody"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("null"));
}

#[test]
fn test_validate() {
    let ws = Workspace::new();
    ws.cmd().args(["validate", "share_history"]).assert().success();
    ws.cmd().args(["validate", "SHARE_HISTORY"]).assert().code(1);
}

#[test]
fn test_missing_paths_is_config_error() {
    let mut cmd = Command::cargo_bin("consent").unwrap();
    cmd.env_remove("CONSENT_CONFIG_PATH")
        .env_remove("CONSENT_REGISTRY_PATH")
        .env_remove("CONSENT_GRANTS_DIR")
        .env("RUST_LOG", "off")
        .arg("catalog")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("CONSENT_CONFIG_PATH"));
}

#[test]
fn test_create_missing_subjects_env_can_be_overridden() {
    let ws = Workspace::new();

    ws.cmd()
        .env("CONSENT_CREATE_MISSING_SUBJECTS", "true")
        .args(["missing", "nobody"])
        .assert()
        .success()
        .stdout(predicate::str::contains("share_history"));

    ws.cmd()
        .env("CONSENT_CREATE_MISSING_SUBJECTS", "true")
        .arg("--create-missing-subjects=false")
        .args(["missing", "nobody"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("null"));
}

#[test]
fn test_paths_from_env() {
    let ws = Workspace::new();
    let mut cmd = Command::cargo_bin("consent").unwrap();
    cmd.env("RUST_LOG", "off")
        .env("CONSENT_CONFIG_PATH", ws.dir.path().join("consents.yaml"))
        .env("CONSENT_REGISTRY_PATH", ws.dir.path().join("widgets.yaml"))
        .env("CONSENT_GRANTS_DIR", ws.dir.path().join("grants"))
        .env_remove("CONSENT_CREATE_MISSING_SUBJECTS")
        .args(["validate", "share_genomics"])
        .assert()
        .success();
}
