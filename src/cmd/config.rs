//! Configuration view and validation commands: `claimboard config`.

use anyhow::Result;
use std::path::Path;

use claimboard::config::{ClaimboardToml, ENV_DB, ENV_LOG, ENV_PORT};
use claimboard::access::nav::default_catalog;

use super::super::ConfigCommands;

fn print_sections(toml: &ClaimboardToml) {
    println!("[server]");
    println!("  port = {}", toml.server.port);
    println!("  host = \"{}\"", toml.server.host);
    println!("  dev_mode = {}", toml.server.dev_mode);
    println!();

    println!("[store]");
    println!("  db_path = \"{}\"", toml.store.db_path.display());
    println!("  feed_capacity = {}", toml.store.feed_capacity);
    println!();

    println!("[logging]");
    println!("  level = \"{}\"", toml.logging.level);
    println!("  format = \"{}\"", toml.logging.format);
    if let Some(file) = &toml.logging.file {
        println!("  file = \"{}\"", file.display());
    }
    println!();

    let catalog = toml.catalog();
    if toml.navigation.is_empty() {
        println!("[[navigation]] (built-in, {} entries)", catalog.len());
    } else {
        println!("[[navigation]] ({} entries)", catalog.len());
    }
    for entry in &catalog {
        println!("  {:<20} {}", entry.id, entry.path);
    }
    println!();
}

pub fn cmd_config(config_path: &Path, command: Option<ConfigCommands>) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Claimboard Configuration");
            println!("========================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
                println!();
                print_sections(&ClaimboardToml::load(config_path)?);
            } else {
                println!("No claimboard.toml found at {}", config_path.display());
                println!();
                println!("Using default configuration:");
                print_sections(&ClaimboardToml::default());
                println!("Run 'claimboard config init' to create a claimboard.toml file.");
                println!();
            }

            let overridden: Vec<&str> = [ENV_PORT, ENV_DB, ENV_LOG]
                .into_iter()
                .filter(|key| std::env::var(key).is_ok())
                .collect();
            if !overridden.is_empty() {
                println!("Effective values (with env overrides):");
                let effective = super::load_effective(config_path)?;
                println!("  port = {}", effective.server.port);
                println!("  db_path = \"{}\"", effective.store.db_path.display());
                println!("  level = \"{}\"", effective.logging.level);
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No claimboard.toml found. Using defaults (valid).");
                return Ok(());
            }

            let toml = ClaimboardToml::load(config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("claimboard.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            if let Some(parent) = config_path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }

            let toml = ClaimboardToml {
                navigation: default_catalog(),
                ..ClaimboardToml::default()
            };
            toml.save(config_path)?;

            println!("Created claimboard.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [server] port, host");
            println!("  - [store] db_path");
            println!("  - [[navigation]] entries shown per role and context");
            println!();
        }
    }

    Ok(())
}
