//! Configuration view and validation commands (`panichd config`).

use anyhow::{Context, Result};
use std::path::Path;

use panichd::config::HelpdeskToml;

use super::super::ConfigCommands;

pub fn cmd_config(config_path: &Path, command: Option<ConfigCommands>) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            if config_path.exists() {
                println!("# Config file: {}", config_path.display());
            } else {
                println!(
                    "# No config file at {}, showing defaults",
                    config_path.display()
                );
            }
            let config = super::load_config(config_path)?;
            let rendered =
                toml::to_string_pretty(&config).context("Failed to render configuration")?;
            println!("{}", rendered);
            print_warnings(&config);
        }
        Some(ConfigCommands::Validate) => {
            let config = super::load_config(config_path)?;
            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                print_warnings(&config);
            }
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                anyhow::bail!("{} already exists", config_path.display());
            }
            HelpdeskToml::default().save(config_path)?;
            println!("Created {}", config_path.display());
        }
    }
    Ok(())
}

fn print_warnings(config: &HelpdeskToml) {
    let warnings = config.validate();
    if warnings.is_empty() {
        return;
    }
    println!("Warnings:");
    for warning in warnings {
        println!("  - {}", warning);
    }
}
