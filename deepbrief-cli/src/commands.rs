//! CLI subcommand handlers.

use crate::CacheAction;
use crate::Commands;
use crate::ConfigAction;
use deepbrief_core::{CacheGateway, DeepBriefConfig, ProviderClass};
use std::path::Path;

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    config: &DeepBriefConfig,
) -> anyhow::Result<()> {
    match command {
        Commands::Cache { action } => handle_cache(action, config),
        Commands::Config { action } => handle_config(action, workspace, config),
    }
}

fn handle_cache(action: CacheAction, config: &DeepBriefConfig) -> anyhow::Result<()> {
    match action {
        CacheAction::Clear { category } => {
            let category = category.map(ProviderClass::from);
            let removed = clear_cache(config, category)?;
            match category {
                Some(class) => println!("Removed {removed} cached {class} response(s)."),
                None => println!("Removed {removed} cached response(s)."),
            }
            Ok(())
        }
    }
}

/// Clear the configured cache backend, optionally limited to one category.
pub fn clear_cache(
    config: &DeepBriefConfig,
    category: Option<ProviderClass>,
) -> anyhow::Result<usize> {
    let gateway = CacheGateway::from_config(&config.cache);
    Ok(gateway.clear(category)?)
}

fn handle_config(
    action: ConfigAction,
    workspace: &Path,
    config: &DeepBriefConfig,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_dir = workspace.join(".deepbrief");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let toml_str = toml::to_string_pretty(&DeepBriefConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            println!("{}", toml::to_string_pretty(config)?);
            Ok(())
        }
    }
}
