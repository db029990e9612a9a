use consent_core::{ConsentManager, ConsentView, EngineConfig, RecordOutcome};
use tracing::debug;

use super::args::*;
use crate::exit_codes::{self, SUCCESS};

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let config = engine_config(&cli.engine);
    debug!(?config, "resolved engine configuration");
    let manager = ConsentManager::from_config(&config)?;

    match cli.cmd {
        Command::Catalog(args) => cmd_catalog(&manager, args).await,
        Command::Missing(args) => {
            let views = manager.get_missing_consents_for_patient(&args.subject).await;
            print_views(&manager, views)
        }
        Command::All(args) => {
            let views = manager.get_all_consents_for_patient(&args.subject).await;
            print_views(&manager, views)
        }
        Command::Grant(args) => Ok(print_bool(
            manager.grant_consent(&args.subject, &args.consent_id).await,
        )),
        Command::Revoke(args) => Ok(print_bool(
            manager.revoke_consent(&args.subject, &args.consent_id).await,
        )),
        Command::Has(args) => Ok(print_bool(
            manager.has_consent(&args.subject, &args.consent_id).await,
        )),
        Command::Set(args) => Ok(print_bool(
            manager
                .set_patient_consents(&args.subject, args.consent_ids.as_slice())
                .await,
        )),
        Command::Validate(args) => Ok(print_bool(
            manager.is_valid_consent_id(&args.consent_id).await,
        )),
    }
}

/// Engine configuration from flags, with their environment fallbacks applied by clap.
pub fn engine_config(args: &EngineArgs) -> EngineConfig {
    let mut config = EngineConfig::default();
    if let Some(path) = &args.config {
        config = config.with_config_path(path);
    }
    if let Some(path) = &args.registry {
        config = config.with_registry_path(path);
    }
    if let Some(dir) = &args.grants_dir {
        config = config.with_grants_dir(dir);
    }
    if let Some(marker) = args.empty_label_marker.as_deref().filter(|m| !m.trim().is_empty()) {
        config = config.with_empty_label_marker(marker);
    }
    if let Some(create) = args.create_missing_subjects {
        config = config.with_create_missing_subjects(create);
    }
    config
}

async fn cmd_catalog(manager: &ConsentManager, args: CatalogArgs) -> anyhow::Result<i32> {
    let catalog = manager.get_system_consents().await;
    let views: Vec<ConsentView> = catalog
        .iter()
        .cloned()
        .map(ConsentView::unprojected)
        .collect();
    print_json(manager.to_json(Some(views.as_slice())))?;

    if args.show_skipped {
        for outcome in manager.catalog().last_outcomes() {
            if let RecordOutcome::Skipped { id, reason } = outcome {
                eprintln!("skipped {}: {}", if id.is_empty() { "<no id>" } else { id.as_str() }, reason);
            }
        }
    }
    Ok(SUCCESS)
}

fn print_views(manager: &ConsentManager, views: Option<Vec<ConsentView>>) -> anyhow::Result<i32> {
    let known = views.is_some();
    print_json(manager.to_json(views.as_deref()))?;
    Ok(exit_codes::from_bool(known))
}

fn print_json(value: Option<serde_json::Value>) -> anyhow::Result<()> {
    let value = value.unwrap_or(serde_json::Value::Null);
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn print_bool(answer: bool) -> i32 {
    println!("{}", answer);
    exit_codes::from_bool(answer)
}
